use std::io::{self, BufRead, Write};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use url::Url;

use crate::client::{
    self, ClientError, CreateAccountRequest, CreateTransactionRequest, MonarchClient,
    SetBudgetRequest, TransactionFilters, UpdateAccountRequest, UpdateTransactionRequest,
};
use crate::config::ConfigPaths;
use crate::credentials::{CredentialSource, CredentialStore, StoredIn};
use crate::gate;
use crate::output::{self, OutputFormat};
use crate::Error;

#[derive(Parser, Debug)]
#[command(
    name = "mmoney",
    version = env!("CARGO_PKG_VERSION"),
    about = "Access your Monarch Money data from the command line.",
    long_about = "Access your Monarch Money data from the command line.\n\n\
        Runs in read-only mode by default for safety (ideal for automated \
        agents); pass --allow-mutations to enable commands that modify data.",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable commands that modify data (create, update, delete). Default: read-only.
    #[arg(long, global = true)]
    pub allow_mutations: bool,

    /// Output format for command results.
    #[arg(long, short = 'f', value_enum, global = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Custom API base URL (proxies, testing).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Verbose diagnostic logging on stderr.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Authentication and session management.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Account management.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
    /// Account holdings and balance history.
    Holdings {
        #[command(subcommand)]
        command: HoldingsCommand,
    },
    /// Transaction management.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommand,
    },
    /// Transaction categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommand,
    },
    /// Transaction tags.
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },
    /// Budget management.
    Budgets {
        #[command(subcommand)]
        command: BudgetsCommand,
    },
    /// Cashflow reports.
    Cashflow {
        #[command(subcommand)]
        command: CashflowCommand,
    },
    /// Recurring transactions.
    Recurring {
        #[command(subcommand)]
        command: RecurringCommand,
    },
    /// Linked institutions.
    Institutions {
        #[command(subcommand)]
        command: InstitutionsCommand,
    },
    /// Subscription status.
    Subscription {
        #[command(subcommand)]
        command: SubscriptionCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Log in and store the session token.
    Login(LoginArgs),
    /// Delete the saved session from the keychain and the session file.
    Logout,
    /// Check authentication status.
    Status,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LoginArgs {
    /// Email address.
    #[arg(long, short = 'e')]
    pub email: Option<String>,
    /// Password.
    #[arg(long, short = 'p')]
    pub password: Option<String>,
    /// MFA secret key for automatic TOTP codes.
    #[arg(long)]
    pub mfa_secret: Option<String>,
    /// One-time MFA code (6 digits).
    #[arg(long)]
    pub mfa_code: Option<String>,
    /// Auth token copied from the browser (bypasses captcha).
    #[arg(long, short = 't')]
    pub token: Option<String>,
    /// Device UUID from the browser (bypasses MFA).
    #[arg(long, short = 'd')]
    pub device_uuid: Option<String>,
    /// Fail instead of prompting for missing credentials.
    #[arg(long)]
    pub no_interactive: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccountsCommand {
    /// List all accounts.
    List,
    /// List available account types and subtypes.
    Types,
    /// Create a manual account.
    Create(CreateAccountArgs),
    /// Update an account.
    Update(UpdateAccountArgs),
    /// Delete an account.
    Delete {
        account_id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Refresh account data from the linked institutions.
    Refresh(RefreshArgs),
    /// Check whether an account refresh has completed.
    RefreshStatus {
        /// Account IDs to check (default: all).
        #[arg(long = "account-id", short = 'a')]
        account_ids: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CreateAccountArgs {
    /// Account name.
    #[arg(long, short = 'n')]
    pub name: String,
    /// Account type.
    #[arg(long = "type", short = 't')]
    pub account_type: String,
    /// Account subtype.
    #[arg(long)]
    pub subtype: String,
    /// Initial balance.
    #[arg(long, short = 'b', default_value_t = 0.0)]
    pub balance: f64,
    /// Exclude the account from net worth.
    #[arg(long)]
    pub not_in_net_worth: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateAccountArgs {
    pub account_id: String,
    /// Account name.
    #[arg(long, short = 'n')]
    pub name: Option<String>,
    /// Account balance.
    #[arg(long, short = 'b')]
    pub balance: Option<f64>,
    /// Account type.
    #[arg(long = "type", short = 't')]
    pub account_type: Option<String>,
    /// Account subtype.
    #[arg(long)]
    pub subtype: Option<String>,
    /// Include in net worth.
    #[arg(long)]
    pub in_net_worth: Option<bool>,
    /// Hide from the summary list.
    #[arg(long)]
    pub hide_from_summary: Option<bool>,
    /// Hide transactions from reports.
    #[arg(long)]
    pub hide_transactions: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct RefreshArgs {
    /// Account IDs to refresh (default: all).
    #[arg(long = "account-id", short = 'a')]
    pub account_ids: Vec<String>,
    /// Start the refresh without waiting for it to finish.
    #[arg(long)]
    pub no_wait: bool,
    /// Timeout in seconds while waiting.
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum HoldingsCommand {
    /// List holdings for an account.
    List { account_id: String },
    /// Get the balance history for an account.
    History { account_id: String },
    /// Get aggregate balance snapshots.
    Snapshots(SnapshotArgs),
    /// Get recent account balances.
    Balances {
        /// Start date (YYYY-MM-DD).
        #[arg(long, short = 's')]
        start_date: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    /// Start date (YYYY-MM-DD).
    #[arg(long, short = 's')]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD).
    #[arg(long, short = 'e')]
    pub end_date: Option<String>,
    /// Filter by account type.
    #[arg(long, short = 't')]
    pub account_type: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TransactionsCommand {
    /// List transactions.
    List(TransactionListArgs),
    /// Get transaction details.
    Get { transaction_id: String },
    /// Get the transactions summary.
    Summary,
    /// Get the splits of a transaction.
    Splits { transaction_id: String },
    /// Create a transaction.
    Create(CreateTransactionArgs),
    /// Update a transaction.
    Update(UpdateTransactionArgs),
    /// Delete a transaction.
    Delete {
        transaction_id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TransactionListArgs {
    /// Number of transactions to fetch.
    #[arg(long, short = 'l', default_value_t = 100)]
    pub limit: u32,
    /// Offset for pagination.
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    /// Start date (YYYY-MM-DD).
    #[arg(long, short = 's')]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD).
    #[arg(long, short = 'e')]
    pub end_date: Option<String>,
    /// Search query.
    #[arg(long, short = 'q', default_value = "")]
    pub search: String,
    /// Filter by category ID (repeatable).
    #[arg(long = "category-id", short = 'c')]
    pub category_ids: Vec<String>,
    /// Filter by account ID (repeatable).
    #[arg(long = "account-id", short = 'a')]
    pub account_ids: Vec<String>,
    /// Filter by tag ID (repeatable).
    #[arg(long = "tag-id", short = 't')]
    pub tag_ids: Vec<String>,
    /// Filter by attachment presence.
    #[arg(long)]
    pub has_attachments: Option<bool>,
    /// Filter by notes presence.
    #[arg(long)]
    pub has_notes: Option<bool>,
    /// Filter split transactions.
    #[arg(long)]
    pub is_split: Option<bool>,
    /// Filter recurring transactions.
    #[arg(long)]
    pub is_recurring: Option<bool>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateTransactionArgs {
    /// Transaction date (YYYY-MM-DD).
    #[arg(long, short = 'd')]
    pub date: String,
    /// Account ID.
    #[arg(long, short = 'a')]
    pub account_id: String,
    /// Amount (negative for an expense).
    #[arg(long, allow_hyphen_values = true)]
    pub amount: f64,
    /// Merchant name.
    #[arg(long, short = 'm')]
    pub merchant: String,
    /// Category ID.
    #[arg(long, short = 'c')]
    pub category_id: String,
    /// Notes.
    #[arg(long, short = 'n', default_value = "")]
    pub notes: String,
    /// Update the account balance to reflect the transaction.
    #[arg(long)]
    pub update_balance: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UpdateTransactionArgs {
    pub transaction_id: String,
    /// Category ID.
    #[arg(long, short = 'c')]
    pub category_id: Option<String>,
    /// Merchant name.
    #[arg(long, short = 'm')]
    pub merchant: Option<String>,
    /// Amount.
    #[arg(long, allow_hyphen_values = true)]
    pub amount: Option<f64>,
    /// Date (YYYY-MM-DD).
    #[arg(long, short = 'd')]
    pub date: Option<String>,
    /// Notes.
    #[arg(long, short = 'n')]
    pub notes: Option<String>,
    /// Hide from reports.
    #[arg(long)]
    pub hide_from_reports: Option<bool>,
    /// Needs-review flag.
    #[arg(long)]
    pub needs_review: Option<bool>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoriesCommand {
    /// List all categories.
    List,
    /// List category groups.
    Groups,
    /// Create a category.
    Create(CreateCategoryArgs),
    /// Delete a category.
    Delete {
        category_id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CreateCategoryArgs {
    /// Category group ID.
    #[arg(long, short = 'g')]
    pub group_id: String,
    /// Category name.
    #[arg(long, short = 'n')]
    pub name: String,
    /// Category icon.
    #[arg(long, default_value = "\u{2753}")]
    pub icon: String,
    /// Enable budget rollover for the category.
    #[arg(long)]
    pub rollover: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagsCommand {
    /// List all tags.
    List,
    /// Create a tag.
    Create {
        /// Tag name.
        #[arg(long, short = 'n')]
        name: String,
        /// Tag color.
        #[arg(long, short = 'c', default_value = "blue")]
        color: String,
    },
    /// Replace the tags on a transaction.
    Set {
        transaction_id: String,
        /// Tag IDs to set (repeatable).
        #[arg(long = "tag-id", short = 't', required = true)]
        tag_ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BudgetsCommand {
    /// List budgets.
    List {
        /// Start date (YYYY-MM-DD).
        #[arg(long, short = 's')]
        start_date: Option<String>,
        /// End date (YYYY-MM-DD).
        #[arg(long, short = 'e')]
        end_date: Option<String>,
    },
    /// Set a budget amount.
    Set(SetBudgetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SetBudgetArgs {
    /// Budget amount.
    #[arg(long, short = 'a', allow_hyphen_values = true)]
    pub amount: f64,
    /// Category ID.
    #[arg(long, short = 'c')]
    pub category_id: Option<String>,
    /// Category group ID.
    #[arg(long, short = 'g')]
    pub category_group_id: Option<String>,
    /// Budget timeframe.
    #[arg(long, default_value = "month")]
    pub timeframe: String,
    /// Start date (YYYY-MM-DD).
    #[arg(long, short = 's')]
    pub start_date: Option<String>,
    /// Apply the amount to future months as well.
    #[arg(long)]
    pub apply_to_future: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CashflowCommand {
    /// Cashflow summary (income, expenses, savings).
    Summary(CashflowArgs),
    /// Detailed cashflow by category and merchant.
    Details(CashflowArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CashflowArgs {
    /// Start date (YYYY-MM-DD).
    #[arg(long, short = 's')]
    pub start_date: Option<String>,
    /// End date (YYYY-MM-DD).
    #[arg(long, short = 'e')]
    pub end_date: Option<String>,
    /// Record limit.
    #[arg(long, short = 'l', default_value_t = 100)]
    pub limit: u32,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RecurringCommand {
    /// List recurring transactions.
    List {
        /// Start date (YYYY-MM-DD).
        #[arg(long, short = 's')]
        start_date: Option<String>,
        /// End date (YYYY-MM-DD).
        #[arg(long, short = 'e')]
        end_date: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum InstitutionsCommand {
    /// List linked institutions.
    List,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubscriptionCommand {
    /// Get subscription details.
    Status,
}

/// Entry point invoked by `run()` with the parsed command line.
pub async fn execute(cli: Cli) -> Result<(), Error> {
    let paths = ConfigPaths::with_project_dirs()?;
    let store = CredentialStore::new(paths);

    if let Commands::Auth { command } = &cli.command {
        return handle_auth(&cli, command, &store).await;
    }

    let client = build_client(&cli, &store)?;
    match &cli.command {
        Commands::Accounts { command } => handle_accounts(&cli, command, &client).await,
        Commands::Holdings { command } => handle_holdings(&cli, command, &client).await,
        Commands::Transactions { command } => handle_transactions(&cli, command, &client).await,
        Commands::Categories { command } => handle_categories(&cli, command, &client).await,
        Commands::Tags { command } => handle_tags(&cli, command, &client).await,
        Commands::Budgets { command } => handle_budgets(&cli, command, &client).await,
        Commands::Cashflow { command } => handle_cashflow(&cli, command, &client).await,
        Commands::Recurring { command } => handle_recurring(&cli, command, &client).await,
        Commands::Institutions { command } => handle_institutions(&cli, command, &client).await,
        Commands::Subscription { command } => handle_subscription(&cli, command, &client).await,
        Commands::Auth { .. } => unreachable!(),
    }
}

fn base_client(cli: &Cli) -> Result<MonarchClient, Error> {
    match &cli.base_url {
        Some(base) => {
            let url = Url::parse(base).map_err(ClientError::InvalidBaseUrl)?;
            Ok(MonarchClient::with_base_url(url)?)
        }
        None => Ok(MonarchClient::new()?),
    }
}

/// Build an API handle with stored credentials attached. A keychain token
/// goes straight onto the auth header; otherwise the session file is
/// loaded best-effort, leaving the client unauthenticated when absent.
fn build_client(cli: &Cli, store: &CredentialStore) -> Result<MonarchClient, Error> {
    let mut client = base_client(cli)?;
    if let Some(token) = store.keyring_token() {
        client.set_token(&token)?;
    } else if let Err(err) = client.load_session(&store.session_file()) {
        tracing::debug!("no usable session file: {err}");
    }
    Ok(client)
}

async fn handle_auth(cli: &Cli, command: &AuthCommand, store: &CredentialStore) -> Result<(), Error> {
    match command {
        AuthCommand::Login(args) => handle_login(cli, args, store).await,
        AuthCommand::Logout => {
            if store.clear() {
                println!("Session deleted.");
            } else {
                println!("No session found.");
            }
            Ok(())
        }
        AuthCommand::Status => {
            match store.resolve() {
                Some(credential) => match credential.source {
                    CredentialSource::Keyring => println!("Authenticated (keychain)"),
                    CredentialSource::SessionFile => println!(
                        "Authenticated (file: {})",
                        store.session_file().display()
                    ),
                },
                None => println!("Not authenticated"),
            }
            Ok(())
        }
    }
}

async fn handle_login(cli: &Cli, args: &LoginArgs, store: &CredentialStore) -> Result<(), Error> {
    if let Some(token) = &args.token {
        report_persisted(store, store.persist(token));
        return Ok(());
    }

    let mut client = base_client(cli)?;
    if let Some(uuid) = &args.device_uuid {
        client.set_device_uuid(uuid)?;
    }

    let token = if let Some(code) = &args.mfa_code {
        let (email, password) =
            require_email_password(args, "--email and --password are required with --mfa-code")?;
        client.multi_factor_authenticate(&email, &password, code).await?
    } else if args.no_interactive {
        let (email, password) = require_email_password(
            args,
            "--email and --password are required for non-interactive login",
        )?;
        client
            .login(&email, &password, args.mfa_secret.as_deref())
            .await?
    } else {
        interactive_login(&mut client, args).await?
    };

    report_persisted(store, store.persist(&token));
    println!("Login successful!");
    Ok(())
}

async fn interactive_login(client: &mut MonarchClient, args: &LoginArgs) -> Result<String, Error> {
    let email = match &args.email {
        Some(email) => email.clone(),
        None => prompt_line("Email: ")?,
    };
    let password = match &args.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password("Password: ").map_err(Error::Runtime)?,
    };
    match client.login(&email, &password, args.mfa_secret.as_deref()).await {
        Ok(token) => Ok(token),
        Err(ClientError::MfaRequired) => {
            let code = prompt_line("MFA code: ")?;
            Ok(client
                .multi_factor_authenticate(&email, &password, &code)
                .await?)
        }
        Err(err) => Err(err.into()),
    }
}

fn require_email_password(args: &LoginArgs, message: &str) -> Result<(String, String), Error> {
    match (&args.email, &args.password) {
        (Some(email), Some(password)) => Ok((email.clone(), password.clone())),
        _ => Err(Error::MissingField(message.to_string())),
    }
}

fn report_persisted(store: &CredentialStore, stored: StoredIn) {
    match stored {
        StoredIn::Keyring => println!("Session saved to system keychain."),
        StoredIn::SessionFile => {
            println!("Session saved to file ({}).", store.session_file().display());
        }
        StoredIn::Nowhere => {
            eprintln!("Warning: the session could not be persisted and will not survive this invocation.");
        }
    }
}

async fn handle_accounts(
    cli: &Cli,
    command: &AccountsCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        AccountsCommand::List => render(&client.get_accounts().await?, cli.format),
        AccountsCommand::Types => render(&client.get_account_type_options().await?, cli.format),
        AccountsCommand::Create(args) => {
            gate::check(cli.allow_mutations)?;
            let request = CreateAccountRequest {
                account_type: args.account_type.clone(),
                account_sub_type: args.subtype.clone(),
                is_in_net_worth: !args.not_in_net_worth,
                account_name: args.name.clone(),
                account_balance: args.balance,
            };
            render(&client.create_manual_account(&request).await?, cli.format)
        }
        AccountsCommand::Update(args) => {
            gate::check(cli.allow_mutations)?;
            let request = UpdateAccountRequest {
                account_name: args.name.clone(),
                account_balance: args.balance,
                account_type: args.account_type.clone(),
                account_sub_type: args.subtype.clone(),
                include_in_net_worth: args.in_net_worth,
                hide_from_summary_list: args.hide_from_summary,
                hide_transactions_from_reports: args.hide_transactions,
            };
            render(
                &client.update_account(&args.account_id, &request).await?,
                cli.format,
            )
        }
        AccountsCommand::Delete { account_id, yes } => {
            gate::check(cli.allow_mutations)?;
            confirm("Are you sure you want to delete this account?", *yes)?;
            render(&client.delete_account(account_id).await?, cli.format)
        }
        AccountsCommand::Refresh(args) => {
            if args.no_wait {
                let started = client.request_accounts_refresh(&args.account_ids).await?;
                println!("Refresh started: {started}");
            } else {
                let ids = (!args.account_ids.is_empty()).then_some(args.account_ids.as_slice());
                let complete = client
                    .request_accounts_refresh_and_wait(ids, args.timeout)
                    .await?;
                println!("Refresh complete: {complete}");
            }
            Ok(())
        }
        AccountsCommand::RefreshStatus { account_ids } => {
            let ids = (!account_ids.is_empty()).then_some(account_ids.as_slice());
            let complete = client.is_accounts_refresh_complete(ids).await?;
            println!("Refresh complete: {complete}");
            Ok(())
        }
    }
}

async fn handle_holdings(
    cli: &Cli,
    command: &HoldingsCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        HoldingsCommand::List { account_id } => {
            render(&client.get_account_holdings(account_id).await?, cli.format)
        }
        HoldingsCommand::History { account_id } => {
            render(&client.get_account_history(account_id).await?, cli.format)
        }
        HoldingsCommand::Snapshots(args) => {
            validate_dates(&[args.start_date.as_deref(), args.end_date.as_deref()])?;
            let response = client
                .get_aggregate_snapshots(
                    args.start_date.as_deref(),
                    args.end_date.as_deref(),
                    args.account_type.as_deref(),
                )
                .await?;
            render(&response, cli.format)
        }
        HoldingsCommand::Balances { start_date } => {
            validate_dates(&[start_date.as_deref()])?;
            let response = client
                .get_recent_account_balances(start_date.as_deref())
                .await?;
            render(&response, cli.format)
        }
    }
}

async fn handle_transactions(
    cli: &Cli,
    command: &TransactionsCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        TransactionsCommand::List(args) => {
            validate_dates(&[args.start_date.as_deref(), args.end_date.as_deref()])?;
            let filters = TransactionFilters {
                limit: args.limit,
                offset: args.offset,
                start_date: args.start_date.clone(),
                end_date: args.end_date.clone(),
                search: args.search.clone(),
                category_ids: args.category_ids.clone(),
                account_ids: args.account_ids.clone(),
                tag_ids: args.tag_ids.clone(),
                has_attachments: args.has_attachments,
                has_notes: args.has_notes,
                is_split: args.is_split,
                is_recurring: args.is_recurring,
            };
            render(&client.get_transactions(&filters).await?, cli.format)
        }
        TransactionsCommand::Get { transaction_id } => render(
            &client.get_transaction_details(transaction_id).await?,
            cli.format,
        ),
        TransactionsCommand::Summary => {
            render(&client.get_transactions_summary().await?, cli.format)
        }
        TransactionsCommand::Splits { transaction_id } => render(
            &client.get_transaction_splits(transaction_id).await?,
            cli.format,
        ),
        TransactionsCommand::Create(args) => {
            gate::check(cli.allow_mutations)?;
            validate_dates(&[Some(args.date.as_str())])?;
            let request = CreateTransactionRequest {
                date: args.date.clone(),
                account_id: args.account_id.clone(),
                amount: args.amount,
                merchant_name: args.merchant.clone(),
                category_id: args.category_id.clone(),
                notes: args.notes.clone(),
                update_balance: args.update_balance,
            };
            render(&client.create_transaction(&request).await?, cli.format)
        }
        TransactionsCommand::Update(args) => {
            gate::check(cli.allow_mutations)?;
            validate_dates(&[args.date.as_deref()])?;
            let request = UpdateTransactionRequest {
                category_id: args.category_id.clone(),
                merchant_name: args.merchant.clone(),
                amount: args.amount,
                date: args.date.clone(),
                notes: args.notes.clone(),
                hide_from_reports: args.hide_from_reports,
                needs_review: args.needs_review,
            };
            render(
                &client.update_transaction(&args.transaction_id, &request).await?,
                cli.format,
            )
        }
        TransactionsCommand::Delete { transaction_id, yes } => {
            gate::check(cli.allow_mutations)?;
            confirm("Are you sure you want to delete this transaction?", *yes)?;
            let response = client.delete_transaction(transaction_id).await?;
            println!("Deleted: {response}");
            Ok(())
        }
    }
}

async fn handle_categories(
    cli: &Cli,
    command: &CategoriesCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        CategoriesCommand::List => render(&client.get_transaction_categories().await?, cli.format),
        CategoriesCommand::Groups => render(
            &client.get_transaction_category_groups().await?,
            cli.format,
        ),
        CategoriesCommand::Create(args) => {
            gate::check(cli.allow_mutations)?;
            let response = client
                .create_transaction_category(&args.group_id, &args.name, &args.icon, args.rollover)
                .await?;
            render(&response, cli.format)
        }
        CategoriesCommand::Delete { category_id, yes } => {
            gate::check(cli.allow_mutations)?;
            confirm("Are you sure you want to delete this category?", *yes)?;
            let response = client.delete_transaction_category(category_id).await?;
            println!("Deleted: {response}");
            Ok(())
        }
    }
}

async fn handle_tags(cli: &Cli, command: &TagsCommand, client: &MonarchClient) -> Result<(), Error> {
    match command {
        TagsCommand::List => render(&client.get_transaction_tags().await?, cli.format),
        TagsCommand::Create { name, color } => {
            gate::check(cli.allow_mutations)?;
            render(&client.create_transaction_tag(name, color).await?, cli.format)
        }
        TagsCommand::Set {
            transaction_id,
            tag_ids,
        } => {
            gate::check(cli.allow_mutations)?;
            render(
                &client.set_transaction_tags(transaction_id, tag_ids).await?,
                cli.format,
            )
        }
    }
}

async fn handle_budgets(
    cli: &Cli,
    command: &BudgetsCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        BudgetsCommand::List {
            start_date,
            end_date,
        } => {
            validate_dates(&[start_date.as_deref(), end_date.as_deref()])?;
            let response = client
                .get_budgets(start_date.as_deref(), end_date.as_deref())
                .await?;
            render(&response, cli.format)
        }
        BudgetsCommand::Set(args) => {
            gate::check(cli.allow_mutations)?;
            validate_dates(&[args.start_date.as_deref()])?;
            let request = SetBudgetRequest {
                amount: args.amount,
                category_id: args.category_id.clone(),
                category_group_id: args.category_group_id.clone(),
                timeframe: args.timeframe.clone(),
                start_date: args.start_date.clone(),
                apply_to_future: args.apply_to_future,
            };
            render(&client.set_budget_amount(&request).await?, cli.format)
        }
    }
}

async fn handle_cashflow(
    cli: &Cli,
    command: &CashflowCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    let (args, detailed) = match command {
        CashflowCommand::Summary(args) => (args, false),
        CashflowCommand::Details(args) => (args, true),
    };
    validate_dates(&[args.start_date.as_deref(), args.end_date.as_deref()])?;
    let response = if detailed {
        client
            .get_cashflow(args.limit, args.start_date.as_deref(), args.end_date.as_deref())
            .await?
    } else {
        client
            .get_cashflow_summary(args.limit, args.start_date.as_deref(), args.end_date.as_deref())
            .await?
    };
    render(&response, cli.format)
}

async fn handle_recurring(
    cli: &Cli,
    command: &RecurringCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        RecurringCommand::List {
            start_date,
            end_date,
        } => {
            validate_dates(&[start_date.as_deref(), end_date.as_deref()])?;
            let response = client
                .get_recurring_transactions(start_date.as_deref(), end_date.as_deref())
                .await?;
            render(&response, cli.format)
        }
    }
}

async fn handle_institutions(
    cli: &Cli,
    command: &InstitutionsCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        InstitutionsCommand::List => render(&client.get_institutions().await?, cli.format),
    }
}

async fn handle_subscription(
    cli: &Cli,
    command: &SubscriptionCommand,
    client: &MonarchClient,
) -> Result<(), Error> {
    match command {
        SubscriptionCommand::Status => {
            render(&client.get_subscription_details().await?, cli.format)
        }
    }
}

fn render(response: &Value, format: OutputFormat) -> Result<(), Error> {
    let stdout = io::stdout();
    output::render(&mut stdout.lock(), response, format)?;
    Ok(())
}

fn validate_dates(values: &[Option<&str>]) -> Result<(), Error> {
    for value in values.iter().copied().flatten() {
        client::validate_date(value)?;
    }
    Ok(())
}

/// Guard a destructive operation behind a y/N prompt on stderr. `--yes`
/// skips the prompt; anything but an explicit yes aborts.
fn confirm(prompt: &str, skip: bool) -> Result<(), Error> {
    if skip {
        return Ok(());
    }
    eprint!("{prompt} [y/N]: ");
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(Error::Runtime)?;
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(Error::Aborted),
    }
}

fn prompt_line(label: &str) -> Result<String, Error> {
    eprint!("{label}");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(Error::Runtime)?;
    Ok(line.trim().to_string())
}
