use tracing::{error, warn};

use dropgate::error::{EXIT_FAILURE, EXIT_USAGE};
use dropgate::gateway::{check_command, error_line, USAGE};
use dropgate::{Config, Database, FileStorage, Gateway, Mode, OriginalCommand, SystemClock};

/// Environment variable set by sshd for forced commands.
const ORIGINAL_COMMAND_ENV: &str = "SSH_ORIGINAL_COMMAND";

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let mode = match Mode::from_args(std::env::args()) {
        Ok(mode) => mode,
        Err(_) => {
            eprintln!("FATAL: {USAGE}");
            return EXIT_USAGE;
        }
    };

    let config = match Config::from_process_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return EXIT_FAILURE;
        }
    };

    dropgate::logging::init(&config.logging);

    let raw_command = std::env::var(ORIGINAL_COMMAND_ENV).unwrap_or_default();
    let command = OriginalCommand::parse(&raw_command);
    if let Err(e) = check_command(mode, &command) {
        warn!(mode = mode.as_str(), command = %command.raw(), "Rejected: {}", e);
        eprintln!("{}", error_line(mode, &e));
        return e.exit_code();
    }

    let storage = match FileStorage::new(config.data_dir()) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to prepare storage directory: {}", e);
            eprintln!("ERROR: {e}");
            return EXIT_FAILURE;
        }
    };

    let db = match Database::open(&config.database.url, config.database.max_connections).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            eprintln!("ERROR: {e}");
            return EXIT_FAILURE;
        }
    };

    let clock = SystemClock;
    let gateway = Gateway::new(&config, &storage, &db, &clock);

    let code = gateway
        .run(
            mode,
            &command,
            tokio::io::stdin(),
            tokio::io::stdout(),
            &mut tokio::io::stderr(),
        )
        .await;

    db.close().await;
    code
}
