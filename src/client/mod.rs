use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::macros::format_description;
use time::Date;
use totp_rs::{Algorithm, Secret, TOTP};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.monarchmoney.com/";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const REFRESH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// High-level client for the Monarch Money GraphQL API.
///
/// Every operation performs exactly one request (the refresh wait being the
/// single poll loop) and returns the raw `data` payload as JSON for the
/// output layer to normalise.
#[derive(Debug, Clone)]
pub struct MonarchClient {
    http: HttpClient,
    base_url: Url,
    headers: HeaderMap,
    token: Option<String>,
}

impl MonarchClient {
    /// Create a client targeting the public API endpoint.
    pub fn new() -> Result<Self, ClientError> {
        let base = Url::parse(DEFAULT_BASE_URL).map_err(ClientError::InvalidBaseUrl)?;
        Self::with_base_url(base)
    }

    /// Create a client with a custom base URL (proxies, testing).
    pub fn with_base_url(base_url: Url) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(base_url);
        let user_agent = format!("mmoney-cli/{}", env!("CARGO_PKG_VERSION"));
        let http = HttpClient::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(ClientError::HttpClient)?;
        let mut headers = HeaderMap::new();
        headers.insert("Client-Platform", HeaderValue::from_static("web"));
        Ok(Self {
            http,
            base_url,
            headers,
            token: None,
        })
    }

    /// Returns the effective base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the currently attached token, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Attach a bearer token to every outbound request.
    ///
    /// The header shape matches what a session load produces, so tokens from
    /// the keychain and from the session file are indistinguishable to the
    /// transport.
    pub fn set_token(&mut self, token: &str) -> Result<(), ClientError> {
        let value = HeaderValue::from_str(&format!("Token {token}"))
            .map_err(|_| ClientError::InvalidToken)?;
        self.headers.insert(AUTHORIZATION, value);
        self.token = Some(token.to_string());
        Ok(())
    }

    /// Attach a browser-issued device identifier, bypassing the MFA prompt.
    pub fn set_device_uuid(&mut self, uuid: &str) -> Result<(), ClientError> {
        let value = HeaderValue::from_str(uuid)
            .map_err(|_| ClientError::Validation("device UUID contains invalid characters".into()))?;
        self.headers.insert("Device-UUID", value);
        Ok(())
    }

    /// Load the session artifact and attach its token.
    pub fn load_session(&mut self, path: &Path) -> Result<(), ClientError> {
        let session = Session::load(path)?;
        self.set_token(&session.token)
    }

    /// Persist the current token as a session artifact.
    pub fn save_session(&self, path: &Path) -> Result<(), ClientError> {
        let token = self.token.as_ref().ok_or(ClientError::MissingSession)?;
        Session {
            token: token.clone(),
        }
        .save(path)
    }

    fn endpoint(&self, fragment: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(fragment)
            .map_err(ClientError::InvalidEndpoint)
    }

    /// Execute a GraphQL operation and return its `data` payload.
    pub async fn graphql(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, ClientError> {
        let url = self.endpoint("graphql")?;
        tracing::debug!(operation, "sending GraphQL request");
        let payload = json!({
            "operationName": operation,
            "query": query,
            "variables": variables,
        });
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await?;
        self.graphql_response(response).await
    }

    async fn graphql_response(&self, response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unable to read error body"));
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ClientError::Unauthorized(message)
                }
                StatusCode::NOT_FOUND => ClientError::NotFound(message),
                StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited(message),
                _ => ClientError::Api { status, message },
            });
        }
        let mut envelope: Value = response.json().await?;
        if let Some(first) = envelope
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            let message = first
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error")
                .to_string();
            return Err(ClientError::Graphql(message));
        }
        Ok(envelope.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    /// Log in with email and password, deriving a TOTP code when an MFA
    /// secret is supplied. On success the token is attached and returned.
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        mfa_secret: Option<&str>,
    ) -> Result<String, ClientError> {
        let mut payload = json!({
            "username": email,
            "password": password,
            "trusted_device": true,
            "supports_mfa": true,
        });
        if let Some(secret) = mfa_secret {
            payload["totp"] = Value::String(totp_code(secret)?);
        }
        let token = self.post_login(&payload, LoginKind::Password).await?;
        self.set_token(&token)?;
        Ok(token)
    }

    /// Complete a login with a one-shot MFA code from an authenticator app.
    pub async fn multi_factor_authenticate(
        &mut self,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<String, ClientError> {
        let payload = json!({
            "username": email,
            "password": password,
            "totp": code,
            "trusted_device": true,
            "supports_mfa": true,
        });
        let token = self.post_login(&payload, LoginKind::Mfa).await?;
        self.set_token(&token)?;
        Ok(token)
    }

    async fn post_login(&self, payload: &Value, kind: LoginKind) -> Result<String, ClientError> {
        let url = self.endpoint("auth/login/")?;
        tracing::debug!("sending login request");
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            return body
                .get("token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ClientError::AuthFailed("login response did not include a token".into())
                });
        }
        let detail = body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("authentication rejected")
            .to_string();
        let mfa_required = body.get("error_code").and_then(Value::as_str) == Some("MFA_REQUIRED")
            || detail.to_ascii_lowercase().contains("multi-factor");
        Err(match kind {
            LoginKind::Mfa => ClientError::MfaFailed(detail),
            LoginKind::Password if mfa_required => ClientError::MfaRequired,
            LoginKind::Password => ClientError::AuthFailed(detail),
        })
    }

    /// Fetch all accounts in the household.
    pub async fn get_accounts(&self) -> Result<Value, ClientError> {
        self.graphql("GetAccounts", ACCOUNTS_QUERY, json!({})).await
    }

    /// Fetch the available account type/subtype options.
    pub async fn get_account_type_options(&self) -> Result<Value, ClientError> {
        self.graphql(
            "GetAccountTypeOptions",
            ACCOUNT_TYPE_OPTIONS_QUERY,
            json!({}),
        )
        .await
    }

    /// Create a manually tracked account.
    pub async fn create_manual_account(
        &self,
        request: &CreateAccountRequest,
    ) -> Result<Value, ClientError> {
        let variables = json!({
            "input": {
                "type": request.account_type,
                "subtype": request.account_sub_type,
                "includeInNetWorth": request.is_in_net_worth,
                "name": request.account_name,
                "displayBalance": request.account_balance,
            }
        });
        self.graphql("Web_CreateManualAccount", CREATE_ACCOUNT_MUTATION, variables)
            .await
    }

    /// Update mutable account properties; absent fields are left untouched.
    pub async fn update_account(
        &self,
        account_id: &str,
        request: &UpdateAccountRequest,
    ) -> Result<Value, ClientError> {
        let mut input = Map::new();
        input.insert("id".to_string(), json!(account_id));
        insert_opt(&mut input, "name", request.account_name.as_ref().map(|v| json!(v)));
        insert_opt(
            &mut input,
            "displayBalance",
            request.account_balance.map(|v| json!(v)),
        );
        insert_opt(&mut input, "type", request.account_type.as_ref().map(|v| json!(v)));
        insert_opt(
            &mut input,
            "subtype",
            request.account_sub_type.as_ref().map(|v| json!(v)),
        );
        insert_opt(
            &mut input,
            "includeInNetWorth",
            request.include_in_net_worth.map(|v| json!(v)),
        );
        insert_opt(
            &mut input,
            "hideFromList",
            request.hide_from_summary_list.map(|v| json!(v)),
        );
        insert_opt(
            &mut input,
            "hideTransactionsFromReports",
            request.hide_transactions_from_reports.map(|v| json!(v)),
        );
        self.graphql(
            "Common_UpdateAccount",
            UPDATE_ACCOUNT_MUTATION,
            json!({ "input": input }),
        )
        .await
    }

    /// Delete an account.
    pub async fn delete_account(&self, account_id: &str) -> Result<Value, ClientError> {
        self.graphql(
            "Common_DeleteAccount",
            DELETE_ACCOUNT_MUTATION,
            json!({ "id": account_id }),
        )
        .await
    }

    /// Request a data refresh from the linked institutions.
    pub async fn request_accounts_refresh(
        &self,
        account_ids: &[String],
    ) -> Result<bool, ClientError> {
        let data = self
            .graphql(
                "Common_ForceRefreshAccountsMutation",
                FORCE_REFRESH_MUTATION,
                json!({ "input": { "accountIds": account_ids } }),
            )
            .await?;
        Ok(data
            .pointer("/forceRefreshAccounts/success")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    /// Check whether a previously requested refresh has finished.
    pub async fn is_accounts_refresh_complete(
        &self,
        account_ids: Option<&[String]>,
    ) -> Result<bool, ClientError> {
        let data = self
            .graphql("ForceRefreshAccountsQuery", REFRESH_STATUS_QUERY, json!({}))
            .await?;
        let accounts = data
            .get("accounts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(accounts
            .iter()
            .filter(|account| match account_ids {
                Some(ids) => account
                    .get("id")
                    .and_then(Value::as_str)
                    .map(|id| ids.iter().any(|candidate| candidate == id))
                    .unwrap_or(false),
                None => true,
            })
            .all(|account| {
                !account
                    .get("hasSyncInProgress")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            }))
    }

    /// Request a refresh and poll until it completes or the deadline passes.
    pub async fn request_accounts_refresh_and_wait(
        &self,
        account_ids: Option<&[String]>,
        timeout_secs: u64,
    ) -> Result<bool, ClientError> {
        self.request_accounts_refresh(account_ids.unwrap_or(&[]))
            .await?;
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if self.is_accounts_refresh_complete(account_ids).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(format!(
                    "account refresh did not complete within {timeout_secs}s"
                )));
            }
            tokio::time::sleep(REFRESH_POLL_INTERVAL).await;
        }
    }

    /// Fetch investment holdings for an account.
    pub async fn get_account_holdings(&self, account_id: &str) -> Result<Value, ClientError> {
        self.graphql(
            "Web_GetHoldings",
            HOLDINGS_QUERY,
            json!({ "input": { "accountIds": [account_id] } }),
        )
        .await
    }

    /// Fetch the balance history for an account.
    pub async fn get_account_history(&self, account_id: &str) -> Result<Value, ClientError> {
        self.graphql(
            "AccountDetails_getAccount",
            ACCOUNT_HISTORY_QUERY,
            json!({ "id": account_id }),
        )
        .await
    }

    /// Fetch aggregate balance snapshots, optionally bounded and filtered.
    pub async fn get_aggregate_snapshots(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
        account_type: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut filters = Map::new();
        insert_opt(&mut filters, "startDate", start_date.map(|v| json!(v)));
        insert_opt(&mut filters, "endDate", end_date.map(|v| json!(v)));
        insert_opt(&mut filters, "accountType", account_type.map(|v| json!(v)));
        self.graphql(
            "GetAggregateSnapshots",
            SNAPSHOTS_QUERY,
            json!({ "filters": filters }),
        )
        .await
    }

    /// Fetch recent balances for every account.
    pub async fn get_recent_account_balances(
        &self,
        start_date: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "GetAccountRecentBalances",
            RECENT_BALANCES_QUERY,
            json!({ "startDate": start_date }),
        )
        .await
    }

    /// Fetch transactions matching the given filters.
    pub async fn get_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "GetTransactionsList",
            TRANSACTIONS_QUERY,
            filters.to_variables(),
        )
        .await
    }

    /// Fetch one transaction with its details.
    pub async fn get_transaction_details(
        &self,
        transaction_id: &str,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "GetTransactionDrawer",
            TRANSACTION_DETAILS_QUERY,
            json!({ "id": transaction_id }),
        )
        .await
    }

    /// Fetch the household transaction summary aggregates.
    pub async fn get_transactions_summary(&self) -> Result<Value, ClientError> {
        self.graphql(
            "GetTransactionsSummary",
            TRANSACTIONS_SUMMARY_QUERY,
            json!({}),
        )
        .await
    }

    /// Fetch the splits of a transaction.
    pub async fn get_transaction_splits(
        &self,
        transaction_id: &str,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "TransactionSplitQuery",
            TRANSACTION_SPLITS_QUERY,
            json!({ "id": transaction_id }),
        )
        .await
    }

    /// Create a transaction.
    pub async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<Value, ClientError> {
        let variables = json!({
            "input": {
                "date": request.date,
                "accountId": request.account_id,
                "amount": request.amount,
                "merchantName": request.merchant_name,
                "categoryId": request.category_id,
                "notes": request.notes,
                "shouldUpdateBalance": request.update_balance,
            }
        });
        self.graphql(
            "Common_CreateTransactionMutation",
            CREATE_TRANSACTION_MUTATION,
            variables,
        )
        .await
    }

    /// Update a transaction; absent fields are left untouched.
    pub async fn update_transaction(
        &self,
        transaction_id: &str,
        request: &UpdateTransactionRequest,
    ) -> Result<Value, ClientError> {
        let mut input = Map::new();
        input.insert("id".to_string(), json!(transaction_id));
        insert_opt(&mut input, "categoryId", request.category_id.as_ref().map(|v| json!(v)));
        insert_opt(&mut input, "merchantName", request.merchant_name.as_ref().map(|v| json!(v)));
        insert_opt(&mut input, "amount", request.amount.map(|v| json!(v)));
        insert_opt(&mut input, "date", request.date.as_ref().map(|v| json!(v)));
        insert_opt(&mut input, "notes", request.notes.as_ref().map(|v| json!(v)));
        insert_opt(
            &mut input,
            "hideFromReports",
            request.hide_from_reports.map(|v| json!(v)),
        );
        insert_opt(&mut input, "needsReview", request.needs_review.map(|v| json!(v)));
        self.graphql(
            "Web_TransactionDrawerUpdateTransaction",
            UPDATE_TRANSACTION_MUTATION,
            json!({ "input": input }),
        )
        .await
    }

    /// Delete a transaction.
    pub async fn delete_transaction(&self, transaction_id: &str) -> Result<Value, ClientError> {
        self.graphql(
            "Common_DeleteTransactionMutation",
            DELETE_TRANSACTION_MUTATION,
            json!({ "input": { "transactionId": transaction_id } }),
        )
        .await
    }

    /// Fetch all transaction categories.
    pub async fn get_transaction_categories(&self) -> Result<Value, ClientError> {
        self.graphql("GetCategories", CATEGORIES_QUERY, json!({})).await
    }

    /// Fetch the category groups.
    pub async fn get_transaction_category_groups(&self) -> Result<Value, ClientError> {
        self.graphql("ManageGetCategoryGroups", CATEGORY_GROUPS_QUERY, json!({}))
            .await
    }

    /// Create a transaction category inside a group.
    pub async fn create_transaction_category(
        &self,
        group_id: &str,
        name: &str,
        icon: &str,
        rollover_enabled: bool,
    ) -> Result<Value, ClientError> {
        let variables = json!({
            "input": {
                "group": group_id,
                "name": name,
                "icon": icon,
                "rolloverEnabled": rollover_enabled,
            }
        });
        self.graphql("Web_CreateCategory", CREATE_CATEGORY_MUTATION, variables)
            .await
    }

    /// Delete a transaction category.
    pub async fn delete_transaction_category(
        &self,
        category_id: &str,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Web_DeleteCategory",
            DELETE_CATEGORY_MUTATION,
            json!({ "id": category_id }),
        )
        .await
    }

    /// Fetch all household transaction tags.
    pub async fn get_transaction_tags(&self) -> Result<Value, ClientError> {
        self.graphql("GetHouseholdTransactionTags", TAGS_QUERY, json!({}))
            .await
    }

    /// Create a transaction tag.
    pub async fn create_transaction_tag(
        &self,
        name: &str,
        color: &str,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Common_CreateTransactionTag",
            CREATE_TAG_MUTATION,
            json!({ "name": name, "color": color }),
        )
        .await
    }

    /// Replace the tag set of a transaction.
    pub async fn set_transaction_tags(
        &self,
        transaction_id: &str,
        tag_ids: &[String],
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Web_SetTransactionTags",
            SET_TAGS_MUTATION,
            json!({ "input": { "transactionId": transaction_id, "tagIds": tag_ids } }),
        )
        .await
    }

    /// Fetch budget data, optionally bounded to a date window.
    pub async fn get_budgets(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Common_GetJointPlanningData",
            BUDGETS_QUERY,
            json!({ "startDate": start_date, "endDate": end_date }),
        )
        .await
    }

    /// Set a budget amount for a category or category group.
    pub async fn set_budget_amount(&self, request: &SetBudgetRequest) -> Result<Value, ClientError> {
        let mut input = Map::new();
        input.insert("amount".to_string(), json!(request.amount));
        input.insert("timeframe".to_string(), json!(request.timeframe));
        input.insert(
            "applyToFuture".to_string(),
            json!(request.apply_to_future),
        );
        insert_opt(&mut input, "categoryId", request.category_id.as_ref().map(|v| json!(v)));
        insert_opt(
            &mut input,
            "categoryGroupId",
            request.category_group_id.as_ref().map(|v| json!(v)),
        );
        insert_opt(&mut input, "startDate", request.start_date.as_ref().map(|v| json!(v)));
        self.graphql(
            "Common_UpdateBudgetItem",
            SET_BUDGET_MUTATION,
            json!({ "input": input }),
        )
        .await
    }

    /// Fetch the cashflow summary (income, expenses, savings).
    pub async fn get_cashflow_summary(
        &self,
        limit: u32,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Web_GetCashFlowSummary",
            CASHFLOW_SUMMARY_QUERY,
            cashflow_variables(limit, start_date, end_date),
        )
        .await
    }

    /// Fetch the detailed cashflow breakdown by category and merchant.
    pub async fn get_cashflow(
        &self,
        limit: u32,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Web_GetCashFlowPage",
            CASHFLOW_QUERY,
            cashflow_variables(limit, start_date, end_date),
        )
        .await
    }

    /// Fetch recurring transaction streams in a date window.
    pub async fn get_recurring_transactions(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.graphql(
            "Web_GetUpcomingRecurringTransactionItems",
            RECURRING_QUERY,
            json!({ "startDate": start_date, "endDate": end_date }),
        )
        .await
    }

    /// Fetch the linked institution credentials.
    pub async fn get_institutions(&self) -> Result<Value, ClientError> {
        self.graphql("Web_GetInstitutionSettings", INSTITUTIONS_QUERY, json!({}))
            .await
    }

    /// Fetch the household subscription details.
    pub async fn get_subscription_details(&self) -> Result<Value, ClientError> {
        self.graphql("GetSubscriptionDetails", SUBSCRIPTION_QUERY, json!({}))
            .await
    }
}

#[derive(Copy, Clone)]
enum LoginKind {
    Password,
    Mfa,
}

/// Validate a `YYYY-MM-DD` date option before any request is made.
pub fn validate_date(value: &str) -> Result<(), ClientError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(value, format).map(|_| ()).map_err(|_| {
        ClientError::InvalidDate(format!("invalid date '{value}'; expected YYYY-MM-DD"))
    })
}

fn totp_code(secret: &str) -> Result<String, ClientError> {
    let normalized = secret.trim().replace(' ', "").to_ascii_uppercase();
    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|_| ClientError::Validation("MFA secret is not valid base32".into()))?;
    let totp = TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, bytes);
    totp.generate_current()
        .map_err(|err| ClientError::Validation(format!("failed to derive TOTP code: {err}")))
}

fn cashflow_variables(limit: u32, start_date: Option<&str>, end_date: Option<&str>) -> Value {
    let mut filters = Map::new();
    filters.insert("search".to_string(), json!(""));
    filters.insert("categories".to_string(), json!([]));
    filters.insert("accounts".to_string(), json!([]));
    filters.insert("tags".to_string(), json!([]));
    insert_opt(&mut filters, "startDate", start_date.map(|v| json!(v)));
    insert_opt(&mut filters, "endDate", end_date.map(|v| json!(v)));
    json!({ "limit": limit, "filters": filters })
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if url.path().is_empty() {
        url.set_path("/");
    } else if !url.path().ends_with('/') {
        let mut path = url.path().trim_end_matches('/').to_string();
        path.push('/');
        url.set_path(&path);
    }
    url
}

/// Filter set accepted by the transactions list operation.
#[derive(Debug, Clone)]
pub struct TransactionFilters {
    pub limit: u32,
    pub offset: u32,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: String,
    pub category_ids: Vec<String>,
    pub account_ids: Vec<String>,
    pub tag_ids: Vec<String>,
    pub has_attachments: Option<bool>,
    pub has_notes: Option<bool>,
    pub is_split: Option<bool>,
    pub is_recurring: Option<bool>,
}

impl Default for TransactionFilters {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            start_date: None,
            end_date: None,
            search: String::new(),
            category_ids: Vec::new(),
            account_ids: Vec::new(),
            tag_ids: Vec::new(),
            has_attachments: None,
            has_notes: None,
            is_split: None,
            is_recurring: None,
        }
    }
}

impl TransactionFilters {
    fn to_variables(&self) -> Value {
        let mut filters = Map::new();
        filters.insert("search".to_string(), json!(self.search));
        filters.insert("categories".to_string(), json!(self.category_ids));
        filters.insert("accounts".to_string(), json!(self.account_ids));
        filters.insert("tags".to_string(), json!(self.tag_ids));
        insert_opt(&mut filters, "startDate", self.start_date.as_ref().map(|v| json!(v)));
        insert_opt(&mut filters, "endDate", self.end_date.as_ref().map(|v| json!(v)));
        insert_opt(&mut filters, "hasAttachments", self.has_attachments.map(|v| json!(v)));
        insert_opt(&mut filters, "hasNotes", self.has_notes.map(|v| json!(v)));
        insert_opt(&mut filters, "isSplit", self.is_split.map(|v| json!(v)));
        insert_opt(&mut filters, "isRecurring", self.is_recurring.map(|v| json!(v)));
        json!({
            "limit": self.limit,
            "offset": self.offset,
            "orderBy": "date",
            "filters": filters,
        })
    }
}

/// Request payload to create a manual account.
#[derive(Debug, Clone, Default)]
pub struct CreateAccountRequest {
    pub account_type: String,
    pub account_sub_type: String,
    pub is_in_net_worth: bool,
    pub account_name: String,
    pub account_balance: f64,
}

/// Request payload to update an account.
#[derive(Debug, Clone, Default)]
pub struct UpdateAccountRequest {
    pub account_name: Option<String>,
    pub account_balance: Option<f64>,
    pub account_type: Option<String>,
    pub account_sub_type: Option<String>,
    pub include_in_net_worth: Option<bool>,
    pub hide_from_summary_list: Option<bool>,
    pub hide_transactions_from_reports: Option<bool>,
}

/// Request payload to create a transaction.
#[derive(Debug, Clone, Default)]
pub struct CreateTransactionRequest {
    pub date: String,
    pub account_id: String,
    pub amount: f64,
    pub merchant_name: String,
    pub category_id: String,
    pub notes: String,
    pub update_balance: bool,
}

/// Request payload to update a transaction.
#[derive(Debug, Clone, Default)]
pub struct UpdateTransactionRequest {
    pub category_id: Option<String>,
    pub merchant_name: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub hide_from_reports: Option<bool>,
    pub needs_review: Option<bool>,
}

/// Request payload to set a budget amount.
#[derive(Debug, Clone, Default)]
pub struct SetBudgetRequest {
    pub amount: f64,
    pub category_id: Option<String>,
    pub category_group_id: Option<String>,
    pub timeframe: String,
    pub start_date: Option<String>,
    pub apply_to_future: bool,
}

/// Persisted session artifact, written only when the secure store is
/// unavailable. Callers other than this module treat it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
}

impl Session {
    /// Read a session artifact from disk.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let contents = fs::read_to_string(path).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write the session artifact with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), ClientError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        restrict_permissions(path).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[source] url::ParseError),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[source] url::ParseError),
    #[error("HTTP client build error: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("authentication required: {0}")]
    Unauthorized(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("rate limited by the API: {0}")]
    RateLimited(String),
    #[error("API request failed with status {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("GraphQL error: {0}")]
    Graphql(String),
    #[error("{0}")]
    AuthFailed(String),
    #[error("multi-factor authentication required")]
    MfaRequired,
    #[error("{0}")]
    MfaFailed(String),
    #[error("auth token contains invalid characters")]
    InvalidToken,
    #[error("request validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    InvalidDate(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("no session is loaded")]
    MissingSession,
    #[error("I/O error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse session file: {0}")]
    SessionParse(#[from] serde_json::Error),
}

const ACCOUNTS_QUERY: &str = "\
query GetAccounts {
  accounts {
    id
    displayName
    currentBalance
    displayBalance
    includeInNetWorth
    isHidden
    isAsset
    updatedAt
    type { name display }
    subtype { name display }
    institution { id name }
  }
}";

const ACCOUNT_TYPE_OPTIONS_QUERY: &str = "\
query GetAccountTypeOptions {
  accountTypeOptions {
    type { name display }
    subtypes { name display }
  }
}";

const CREATE_ACCOUNT_MUTATION: &str = "\
mutation Web_CreateManualAccount($input: CreateManualAccountMutationInput!) {
  createManualAccount(input: $input) {
    account { id displayName currentBalance }
    errors { message }
  }
}";

const UPDATE_ACCOUNT_MUTATION: &str = "\
mutation Common_UpdateAccount($input: UpdateAccountMutationInput!) {
  updateAccount(input: $input) {
    account { id displayName displayBalance updatedAt }
    errors { message }
  }
}";

const DELETE_ACCOUNT_MUTATION: &str = "\
mutation Common_DeleteAccount($id: UUID!) {
  deleteAccount(id: $id) {
    deleted
    errors { message }
  }
}";

const FORCE_REFRESH_MUTATION: &str = "\
mutation Common_ForceRefreshAccountsMutation($input: ForceRefreshAccountsInput!) {
  forceRefreshAccounts(input: $input) {
    success
    errors { message }
  }
}";

const REFRESH_STATUS_QUERY: &str = "\
query ForceRefreshAccountsQuery {
  accounts {
    id
    hasSyncInProgress
  }
}";

const HOLDINGS_QUERY: &str = "\
query Web_GetHoldings($input: PortfolioInput) {
  portfolio(input: $input) {
    aggregateHoldings {
      edges {
        node {
          id
          quantity
          basis
          totalValue
          security { id name ticker currentPrice }
        }
      }
    }
  }
}";

const ACCOUNT_HISTORY_QUERY: &str = "\
query AccountDetails_getAccount($id: UUID!) {
  account(id: $id) {
    id
    displayName
    balanceHistory: recentBalances
  }
}";

const SNAPSHOTS_QUERY: &str = "\
query GetAggregateSnapshots($filters: AggregateSnapshotFilters) {
  snapshots: aggregateSnapshots(filters: $filters) {
    date
    balance
  }
}";

const RECENT_BALANCES_QUERY: &str = "\
query GetAccountRecentBalances($startDate: Date) {
  accounts {
    id
    recentBalances(startDate: $startDate)
  }
}";

const TRANSACTIONS_QUERY: &str = "\
query GetTransactionsList($offset: Int, $limit: Int, $filters: TransactionFilterInput, $orderBy: TransactionOrdering) {
  allTransactions(filters: $filters) {
    totalCount
    results(offset: $offset, limit: $limit, orderBy: $orderBy) {
      id
      date
      amount
      pending
      notes
      merchant { id name }
      category { id name }
      account { id displayName }
      tags { id name }
    }
  }
}";

const TRANSACTION_DETAILS_QUERY: &str = "\
query GetTransactionDrawer($id: UUID!) {
  getTransaction(id: $id) {
    id
    date
    amount
    pending
    notes
    hideFromReports
    needsReview
    merchant { id name }
    category { id name }
    account { id displayName }
    tags { id name }
  }
}";

const TRANSACTIONS_SUMMARY_QUERY: &str = "\
query GetTransactionsSummary {
  aggregates(filters: {}) {
    summary {
      count
      sumIncome
      sumExpense
      savings
      savingsRate
    }
  }
}";

const TRANSACTION_SPLITS_QUERY: &str = "\
query TransactionSplitQuery($id: UUID!) {
  getTransaction(id: $id) {
    id
    amount
    splitTransactions {
      id
      amount
      notes
      merchant { id name }
      category { id name }
    }
  }
}";

const CREATE_TRANSACTION_MUTATION: &str = "\
mutation Common_CreateTransactionMutation($input: CreateTransactionMutationInput!) {
  createTransaction(input: $input) {
    transaction { id }
    errors { message }
  }
}";

const UPDATE_TRANSACTION_MUTATION: &str = "\
mutation Web_TransactionDrawerUpdateTransaction($input: UpdateTransactionMutationInput!) {
  updateTransaction(input: $input) {
    transaction { id amount date notes }
    errors { message }
  }
}";

const DELETE_TRANSACTION_MUTATION: &str = "\
mutation Common_DeleteTransactionMutation($input: DeleteTransactionMutationInput!) {
  deleteTransaction(input: $input) {
    deleted
    errors { message }
  }
}";

const CATEGORIES_QUERY: &str = "\
query GetCategories {
  categories {
    id
    name
    icon
    order
    systemCategory
    group { id name type }
  }
}";

const CATEGORY_GROUPS_QUERY: &str = "\
query ManageGetCategoryGroups {
  categoryGroups {
    id
    name
    order
    type
  }
}";

const CREATE_CATEGORY_MUTATION: &str = "\
mutation Web_CreateCategory($input: CreateCategoryInput!) {
  createCategory(input: $input) {
    category { id name icon }
    errors { message }
  }
}";

const DELETE_CATEGORY_MUTATION: &str = "\
mutation Web_DeleteCategory($id: UUID!) {
  deleteCategory(id: $id) {
    deleted
    errors { message }
  }
}";

const TAGS_QUERY: &str = "\
query GetHouseholdTransactionTags {
  householdTransactionTags {
    id
    name
    color
    order
    transactionCount
  }
}";

const CREATE_TAG_MUTATION: &str = "\
mutation Common_CreateTransactionTag($name: String!, $color: String!) {
  createTransactionTag(input: {name: $name, color: $color}) {
    tag { id name color }
    errors { message }
  }
}";

const SET_TAGS_MUTATION: &str = "\
mutation Web_SetTransactionTags($input: SetTransactionTagsInput!) {
  setTransactionTags(input: $input) {
    transaction { id tags { id name } }
    errors { message }
  }
}";

const BUDGETS_QUERY: &str = "\
query Common_GetJointPlanningData($startDate: Date, $endDate: Date) {
  budgetData(startMonth: $startDate, endMonth: $endDate) {
    monthlyAmountsByCategory {
      category { id name }
      monthlyAmounts {
        month
        plannedCashFlowAmount
        actualAmount
        remainingAmount
      }
    }
  }
}";

const SET_BUDGET_MUTATION: &str = "\
mutation Common_UpdateBudgetItem($input: UpdateOrCreateBudgetItemMutationInput!) {
  updateOrCreateBudgetItem(input: $input) {
    budgetItem { id plannedCashFlowAmount }
    errors { message }
  }
}";

const CASHFLOW_SUMMARY_QUERY: &str = "\
query Web_GetCashFlowSummary($limit: Int, $filters: TransactionFilterInput) {
  summary: aggregates(filters: $filters, fillEmptyValues: true, limit: $limit) {
    summary {
      sumIncome
      sumExpense
      savings
      savingsRate
    }
  }
}";

const CASHFLOW_QUERY: &str = "\
query Web_GetCashFlowPage($limit: Int, $filters: TransactionFilterInput) {
  byCategory: aggregates(filters: $filters, groupBy: [\"category\"], limit: $limit) {
    groupBy { category { id name } }
    summary { sum }
  }
  byMerchant: aggregates(filters: $filters, groupBy: [\"merchant\"], limit: $limit) {
    groupBy { merchant { id name } }
    summary { sum }
  }
}";

const RECURRING_QUERY: &str = "\
query Web_GetUpcomingRecurringTransactionItems($startDate: Date, $endDate: Date) {
  recurringTransactionItems(startDate: $startDate, endDate: $endDate) {
    date
    amount
    isPast
    stream {
      id
      name
      frequency
      merchant { id name }
    }
  }
}";

const INSTITUTIONS_QUERY: &str = "\
query Web_GetInstitutionSettings {
  credentials {
    id
    updateRequired
    dataProvider
    disconnectedFromDataProviderAt
    institution { id name url status }
  }
}";

const SUBSCRIPTION_QUERY: &str = "\
query GetSubscriptionDetails {
  subscription {
    id
    paymentSource
    referralCode
    isOnFreeTrial
    hasPremiumEntitlement
    trialEndsAt
  }
}";

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_client(server: &MockServer) -> MonarchClient {
        let url = Url::parse(&format!("{}/", server.base_url())).expect("url parse");
        MonarchClient::with_base_url(url).expect("client")
    }

    #[tokio::test]
    async fn graphql_requests_carry_the_token_header() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .header("authorization", "Token secret")
                    .body_contains("GetAccounts");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "accounts": [ { "id": "1" } ] }
                    }));
            })
            .await;

        let mut client = test_client(&server);
        client.set_token("secret").expect("set token");
        let data = client.get_accounts().await.expect("accounts");
        assert_eq!(data["accounts"][0]["id"], "1");
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql");
                then.status(401).body("unauthorized");
            })
            .await;

        let client = test_client(&server);
        let err = client.get_accounts().await.expect_err("auth error");
        assert!(matches!(err, ClientError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn not_found_and_rate_limit_statuses_are_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql").body_contains("GetAccounts");
                then.status(404).body("missing");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql").body_contains("GetCategories");
                then.status(429).body("slow down");
            })
            .await;

        let client = test_client(&server);
        assert!(matches!(
            client.get_accounts().await.expect_err("404"),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            client.get_transaction_categories().await.expect_err("429"),
            ClientError::RateLimited(_)
        ));
    }

    #[tokio::test]
    async fn graphql_errors_surface_the_first_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/graphql");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": null,
                        "errors": [ { "message": "Record not found" } ]
                    }));
            })
            .await;

        let client = test_client(&server);
        let err = client.get_accounts().await.expect_err("graphql error");
        assert!(matches!(err, ClientError::Graphql(message) if message == "Record not found"));
    }

    #[tokio::test]
    async fn transactions_query_sends_filters_and_pagination() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("\"limit\":10")
                    .body_contains("\"offset\":50")
                    .body_contains("\"search\":\"coffee\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "allTransactions": { "totalCount": 0, "results": [] } }
                    }));
            })
            .await;

        let client = test_client(&server);
        let filters = TransactionFilters {
            limit: 10,
            offset: 50,
            search: "coffee".into(),
            ..TransactionFilters::default()
        };
        let data = client.get_transactions(&filters).await.expect("list");
        mock.assert_async().await;
        assert_eq!(data["allTransactions"]["totalCount"], 0);
    }

    #[tokio::test]
    async fn login_returns_and_attaches_the_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/auth/login/")
                    .body_contains("\"username\":\"user@example.com\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({ "token": "tok-1" }));
            })
            .await;

        let mut client = test_client(&server);
        let token = client
            .login("user@example.com", "hunter2", None)
            .await
            .expect("login");
        assert_eq!(token, "tok-1");
        assert_eq!(client.token(), Some("tok-1"));
    }

    #[tokio::test]
    async fn login_detects_mfa_requirement() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/login/");
                then.status(403)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "error_code": "MFA_REQUIRED",
                        "detail": "Multi-Factor Auth Required"
                    }));
            })
            .await;

        let mut client = test_client(&server);
        let err = client
            .login("user@example.com", "hunter2", None)
            .await
            .expect_err("mfa required");
        assert!(matches!(err, ClientError::MfaRequired));
    }

    #[tokio::test]
    async fn mfa_login_failure_is_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/auth/login/");
                then.status(401)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({ "detail": "Invalid MFA code" }));
            })
            .await;

        let mut client = test_client(&server);
        let err = client
            .multi_factor_authenticate("user@example.com", "hunter2", "000000")
            .await
            .expect_err("mfa failed");
        assert!(matches!(err, ClientError::MfaFailed(detail) if detail == "Invalid MFA code"));
    }

    #[tokio::test]
    async fn invalid_mfa_secret_fails_before_any_request() {
        let server = MockServer::start_async().await;
        let mut client = test_client(&server);
        let err = client
            .login("user@example.com", "hunter2", Some("!!not-base32!!"))
            .await
            .expect_err("validation");
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn refresh_and_wait_returns_once_sync_is_done() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("Common_ForceRefreshAccountsMutation");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "forceRefreshAccounts": { "success": true, "errors": null } }
                    }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("ForceRefreshAccountsQuery");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "accounts": [
                            { "id": "1", "hasSyncInProgress": false },
                            { "id": "2", "hasSyncInProgress": false }
                        ] }
                    }));
            })
            .await;

        let client = test_client(&server);
        let done = client
            .request_accounts_refresh_and_wait(None, 5)
            .await
            .expect("refresh");
        assert!(done);
    }

    #[tokio::test]
    async fn refresh_and_wait_times_out_while_still_syncing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("Common_ForceRefreshAccountsMutation");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "forceRefreshAccounts": { "success": true } }
                    }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("ForceRefreshAccountsQuery");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "accounts": [ { "id": "1", "hasSyncInProgress": true } ] }
                    }));
            })
            .await;

        let client = test_client(&server);
        let err = client
            .request_accounts_refresh_and_wait(None, 0)
            .await
            .expect_err("timeout");
        assert!(matches!(err, ClientError::Timeout(_)));
    }

    #[tokio::test]
    async fn refresh_completion_only_considers_requested_accounts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/graphql")
                    .body_contains("ForceRefreshAccountsQuery");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "data": { "accounts": [
                            { "id": "1", "hasSyncInProgress": false },
                            { "id": "2", "hasSyncInProgress": true }
                        ] }
                    }));
            })
            .await;

        let client = test_client(&server);
        let only_first = vec!["1".to_string()];
        assert!(client
            .is_accounts_refresh_complete(Some(&only_first))
            .await
            .expect("status"));
        assert!(!client
            .is_accounts_refresh_complete(None)
            .await
            .expect("status"));
    }

    #[test]
    fn session_round_trips_through_disk() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let path = tmp.path().join("session.json");
        Session {
            token: "round-trip".into(),
        }
        .save(&path)
        .expect("save");

        let loaded = Session::load(&path).expect("load");
        assert_eq!(loaded.token, "round-trip");

        let mut client = MonarchClient::new().expect("client");
        client.load_session(&path).expect("load session");
        assert_eq!(client.token(), Some("round-trip"));
    }

    #[test]
    fn corrupt_session_file_fails_to_parse() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            Session::load(&path).expect_err("corrupt"),
            ClientError::SessionParse(_)
        ));
    }

    #[test]
    fn save_session_requires_a_token() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let client = MonarchClient::new().expect("client");
        let err = client
            .save_session(&tmp.path().join("session.json"))
            .expect_err("no token");
        assert!(matches!(err, ClientError::MissingSession));
    }

    #[test]
    fn dates_validate_strictly() {
        assert!(validate_date("2024-01-15").is_ok());
        assert!(validate_date("2024-13-01").is_err());
        assert!(validate_date("15/01/2024").is_err());
        assert!(validate_date("not-a-date").is_err());
    }
}
