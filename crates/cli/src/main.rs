//! `devisio`: scheduled-sweep entry points over a file-backed snapshot.
//!
//! Usage:
//!
//! ```text
//! devisio <expire-quotes|dispatch-reminders|renew-subscriptions> \
//!     [--store <path>] [--today <YYYY-MM-DD>]
//! ```
//!
//! The store path defaults to `$BILLING_STORE`, then `./billing.json`.
//! `--today` overrides the reference date, mainly for replaying a sweep.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};

use devisio_engine::{BillingEngine, snapshot};
use devisio_events::InMemorySink;

struct Args {
    command: String,
    store: PathBuf,
    today: NaiveDate,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("missing command: expire-quotes | dispatch-reminders | renew-subscriptions");
    };

    let mut store = None;
    let mut today = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--store" => {
                let value = args.next().context("--store requires a path")?;
                store = Some(PathBuf::from(value));
            }
            "--today" => {
                let value = args.next().context("--today requires a date")?;
                let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .with_context(|| format!("invalid --today date: {value}"))?;
                today = Some(date);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let store = store
        .or_else(|| std::env::var("BILLING_STORE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("billing.json"));

    Ok(Args {
        command,
        store,
        today: today.unwrap_or_else(|| Utc::now().date_naive()),
    })
}

fn main() -> anyhow::Result<()> {
    devisio_observability::init();
    let args = parse_args()?;

    let store = snapshot::load_or_default(&args.store)
        .with_context(|| format!("loading store {}", args.store.display()))?;
    let engine = BillingEngine::new(store, Arc::new(InMemorySink::new()));

    let count = match args.command.as_str() {
        "expire-quotes" => engine.expire_overdue_quotes(args.today)?,
        "dispatch-reminders" => engine.dispatch_due_reminders(args.today)?,
        "renew-subscriptions" => engine.renew_manual_subscriptions(args.today)?,
        other => bail!("unknown command: {other}"),
    };

    snapshot::save(engine.store(), &args.store)
        .with_context(|| format!("saving store {}", args.store.display()))?;
    tracing::info!(command = %args.command, count, "sweep finished");
    println!("{count}");
    Ok(())
}
