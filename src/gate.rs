/// Remediation hint attached to every gate denial.
pub const REMEDIATION: &str = "Example: mmoney --allow-mutations accounts create ...";

/// Denial raised when a state-changing command runs in read-only mode.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("This command modifies data. Use --allow-mutations to enable.")]
pub struct GateError;

/// Check the process-wide mutation permission before a state-changing
/// operation. The flag is fixed once at argument parsing; this never
/// consults any other state.
pub fn check(allow_mutations: bool) -> Result<(), GateError> {
    if allow_mutations {
        Ok(())
    } else {
        Err(GateError)
    }
}
