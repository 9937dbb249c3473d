//! Operator CLI over a local Prime Bank directory.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use prime_bank::{
    AccountStore, AwardCoordinator, AwardRequest, BankConfig, BankError, Currency,
    LedgerReconciler, LocalFileStore, Role, SystemClock,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "prime_bank")]
#[command(author, version, about = "Award currency and inspect Prime Bank accounts")]
struct Cli {
    /// Directory holding account and ledger files
    #[arg(long)]
    root: PathBuf,

    /// TOML config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Award currency to a user
    Award {
        #[arg(long)]
        user: String,

        /// Fan, Bestie or Creator
        #[arg(long)]
        role: Role,

        /// primeCoins or creatorCredits
        #[arg(long, default_value = "primeCoins")]
        currency: Currency,

        #[arg(long, allow_hyphen_values = true)]
        amount: i64,

        #[arg(long)]
        source: String,

        /// Idempotency key; derived from the request content when omitted
        #[arg(long)]
        key: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Show balances and cap usage
    Account {
        #[arg(long)]
        user: String,
    },

    /// List ledger entries, oldest first
    History {
        #[arg(long)]
        user: String,
    },

    /// Compare the ledger with stored balances
    Reconcile {
        /// Single user; every account when omitted
        #[arg(long)]
        user: Option<String>,

        /// Re-append ledger entries missing for recorded receipts
        #[arg(long)]
        repair: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let stdout = io::stdout();
    if let Err(err) = run(cli, &mut stdout.lock()) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli, out: &mut impl Write) -> Result<(), BankError> {
    let config = match &cli.config {
        Some(path) => BankConfig::load(path)?,
        None => BankConfig::default(),
    };
    let store = Arc::new(LocalFileStore::new(&cli.root));
    let coordinator =
        AwardCoordinator::new(&config, store.clone(), store.clone(), Arc::new(SystemClock));

    match cli.command {
        Commands::Award {
            user,
            role,
            currency,
            amount,
            source,
            key,
            notes,
        } => {
            let mut request = AwardRequest::new(user, role, currency, amount, source);
            if let Some(key) = key {
                request = request.with_idempotency_key(key);
            }
            if let Some(notes) = notes {
                request = request.with_notes(notes);
            }
            print_json(out, &coordinator.award_currency(&request)?)
        }
        Commands::Account { user } => print_json(out, &coordinator.get_account(&user)?),
        Commands::History { user } => print_json(out, &coordinator.history(&user)?),
        Commands::Reconcile { user, repair } => {
            let user_ids = match user {
                Some(user) => vec![user],
                None => store.user_ids()?,
            };
            let reconciler = LedgerReconciler::new(store, coordinator.ledger().clone());
            let mut reports = Vec::with_capacity(user_ids.len());
            for user_id in &user_ids {
                if repair {
                    reconciler.repair(user_id)?;
                }
                reports.push(reconciler.check(user_id)?);
            }
            print_json(out, &reports)?;
            if reports.iter().all(|report| report.is_ok()) {
                Ok(())
            } else {
                Err(BankError::Store(
                    "ledger and balances disagree; rerun with --repair".to_string(),
                ))
            }
        }
    }
}

fn print_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<(), BankError> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}
