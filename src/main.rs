use std::process;

fn main() {
    if let Err(err) = mmoney_cli::run() {
        if matches!(err, mmoney_cli::Error::Aborted) {
            eprintln!("Aborted.");
        } else {
            let rendered = serde_json::to_string_pretty(&err.envelope())
                .unwrap_or_else(|_| err.to_string());
            eprintln!("{rendered}");
        }
        process::exit(err.exit_code());
    }
}
