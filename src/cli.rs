//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::system_clock::SystemClock;
use crate::domain::desk::{parse_date, EtfDesk};
use crate::domain::error::EtfDeskError;
use crate::domain::settings::Settings;
use crate::logging;

#[derive(Parser, Debug)]
#[command(name = "etfdesk", about = "ETF data acquisition and decision engine")]
pub struct Cli {
    /// INI configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a validated daily price series
    Fetch {
        symbol: String,
        /// YYYY-MM-DD; defaults to the signal window before --end
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD; defaults to today
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List ETFs of a market (A or US)
    List {
        #[arg(short, long, default_value = "A")]
        market: String,
    },
    /// Evaluate the buy signal for a symbol
    Signal {
        symbol: String,
        #[arg(long)]
        json: bool,
    },
    /// Show data source health
    Sources {
        /// Run a connection test against every source first
        #[arg(long)]
        probe: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage the target portfolio
    Portfolio {
        #[command(subcommand)]
        action: PortfolioCommand,
    },
    /// Inspect or clear the data cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PortfolioCommand {
    /// Print the target weights and threshold
    Show,
    /// Add or replace one target weight
    Add { symbol: String, weight: f64 },
    /// Remove a symbol from the targets
    Remove { symbol: String },
    /// Replace all weights, e.g. `SPY=0.6 QQQ=0.4`
    SetWeights {
        #[arg(required = true)]
        weights: Vec<String>,
    },
    /// Set the rebalance threshold
    Threshold { value: f64 },
    /// Suggest rebalance actions for the given holdings
    Rebalance {
        /// Holdings as SYMBOL=QUANTITY
        #[arg(long = "holding", value_name = "SYMBOL=QTY")]
        holdings: Vec<String>,
        /// Prices as SYMBOL=PRICE; fetched when omitted
        #[arg(long = "price", value_name = "SYMBOL=PRICE")]
        prices: Vec<String>,
        /// Overrides the configured threshold
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Remove every entry
    Clear,
    /// Entry counts and size
    Info,
    /// Remove expired entries
    Prune,
}

pub fn run(cli: Cli) -> ExitCode {
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    logging::init(settings.log_level.as_deref());

    let mut desk = match EtfDesk::from_settings(&settings, Arc::new(SystemClock)) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match execute(&mut desk, &cli.command, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Settings from `path` (or defaults), environment overrides, validation.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, EtfDeskError> {
    let adapter = match path {
        Some(p) => FileConfigAdapter::from_file(p)?,
        None => FileConfigAdapter::empty(),
    };
    Settings::load(&adapter)
}

/// Parses `SYMBOL=VALUE` pairs; symbols are upper-cased.
pub fn parse_assignments(items: &[String]) -> Result<BTreeMap<String, f64>, EtfDeskError> {
    let mut map = BTreeMap::new();
    for item in items.iter().flat_map(|i| i.split(',')) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (symbol, value) = item.split_once('=').ok_or_else(|| {
            EtfDeskError::validation(format!("expected SYMBOL=VALUE, got '{item}'"))
        })?;
        let value: f64 = value.trim().parse().map_err(|_| {
            EtfDeskError::validation(format!("'{}' is not a number in '{item}'", value.trim()))
        })?;
        map.insert(symbol.trim().to_uppercase(), value);
    }
    Ok(map)
}

fn write_json<T: serde::Serialize>(out: &mut dyn Write, value: &T) -> Result<(), EtfDeskError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Runs one command against `desk`, writing results to `out`.
pub fn execute(desk: &mut EtfDesk, command: &Command, out: &mut dyn Write) -> Result<(), EtfDeskError> {
    match command {
        Command::Fetch {
            symbol,
            start,
            end,
            json,
        } => {
            let end = match end {
                Some(e) => parse_date(e)?,
                None => desk.today(),
            };
            let start = match start {
                Some(s) => parse_date(s)?,
                None => end - chrono::Duration::days(desk.signals().config().default_window_days),
            };
            let series = desk.get_etf_data(
                symbol,
                &start.format("%Y-%m-%d").to_string(),
                &end.format("%Y-%m-%d").to_string(),
            )?;
            if *json {
                return write_json(out, &series);
            }
            writeln!(out, "date,open,high,low,close,volume")?;
            for bar in series.bars() {
                writeln!(
                    out,
                    "{},{},{},{},{},{}",
                    bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
                )?;
            }
            eprintln!("{} bars for {}", series.len(), series.symbol());
        }
        Command::List { market } => {
            let listings = desk.get_etf_list(market)?;
            for listing in &listings {
                writeln!(out, "{}\t{}", listing.symbol, listing.name)?;
            }
            eprintln!("{} ETFs listed", listings.len());
        }
        Command::Signal { symbol, json } => {
            let signal = desk.generate_buy_signal(symbol, None)?;
            if *json {
                return write_json(out, &signal);
            }
            write!(out, "{}", signal.explain())?;
        }
        Command::Sources { probe, json } => {
            let states = if *probe {
                desk.probe_sources()
            } else {
                desk.source_states()
            };
            if *json {
                return write_json(out, &states);
            }
            for s in &states {
                let status = if s.available { "available" } else { "unavailable" };
                write!(out, "{}. {} [{}] {}", s.priority + 1, s.name, s.tier, status)?;
                if let Some(err) = &s.last_error {
                    write!(out, " (last error: {err})")?;
                }
                writeln!(out)?;
            }
        }
        Command::Portfolio { action } => run_portfolio(desk, action, out)?,
        Command::Cache { action } => match action {
            CacheCommand::Clear => {
                let removed = desk.clear_cache()?;
                writeln!(out, "removed {removed} cache entries")?;
            }
            CacheCommand::Prune => {
                let removed = desk.prune_cache()?;
                writeln!(out, "removed {removed} expired cache entries")?;
            }
            CacheCommand::Info => {
                let stats = desk.cache_stats()?;
                writeln!(out, "entries: {}", stats.total)?;
                writeln!(out, "valid:   {}", stats.valid)?;
                writeln!(out, "expired: {}", stats.expired)?;
                writeln!(out, "bytes:   {}", stats.bytes)?;
            }
        },
    }
    Ok(())
}

fn run_portfolio(
    desk: &mut EtfDesk,
    action: &PortfolioCommand,
    out: &mut dyn Write,
) -> Result<(), EtfDeskError> {
    match action {
        PortfolioCommand::Show => match desk.get_portfolio_config() {
            None => writeln!(out, "no portfolio configured")?,
            Some(config) => {
                for (symbol, weight) in &config.etf_weights {
                    writeln!(out, "{symbol}\t{:.2}%", weight * 100.0)?;
                }
                writeln!(out, "total weight: {:.2}%", config.total_weight() * 100.0)?;
                writeln!(out, "rebalance threshold: {:.2}%", config.rebalance_threshold * 100.0)?;
                writeln!(out, "created: {}", config.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
            }
        },
        PortfolioCommand::Add { symbol, weight } => {
            let symbol = crate::domain::desk::normalize_symbol(symbol)?;
            desk.portfolio_mut().add_etf(&symbol, *weight)?;
            writeln!(out, "added {symbol} at {:.2}%", weight * 100.0)?;
        }
        PortfolioCommand::Remove { symbol } => {
            let symbol = symbol.trim().to_uppercase();
            desk.portfolio_mut().remove_etf(&symbol)?;
            writeln!(out, "removed {symbol}")?;
        }
        PortfolioCommand::SetWeights { weights } => {
            let weights = parse_assignments(weights)?;
            let count = weights.len();
            desk.portfolio_mut().update_weights(weights)?;
            writeln!(out, "updated {count} target weights")?;
        }
        PortfolioCommand::Threshold { value } => {
            desk.portfolio_mut().set_rebalance_threshold(*value)?;
            writeln!(out, "rebalance threshold set to {:.2}%", value * 100.0)?;
        }
        PortfolioCommand::Rebalance {
            holdings,
            prices,
            threshold,
            json,
        } => {
            desk.portfolio_mut().update_holdings(parse_assignments(holdings)?)?;
            let prices = if prices.is_empty() {
                desk.market_prices()?
            } else {
                parse_assignments(prices)?
            };
            let actions = desk.portfolio().rebalance_suggestions(&prices, *threshold)?;
            if *json {
                return write_json(out, &actions);
            }
            let total = desk.portfolio().portfolio_value(&prices);
            writeln!(out, "portfolio value: {total:.2}")?;
            writeln!(out, "symbol\taction\tcurrent\ttarget\tdeviation\tamount")?;
            for a in &actions {
                writeln!(
                    out,
                    "{}\t{}\t{:.2}%\t{:.2}%\t{:.2}%\t{:.2}",
                    a.symbol,
                    a.action,
                    a.current_weight * 100.0,
                    a.target_weight * 100.0,
                    a.deviation * 100.0,
                    a.suggested_amount
                )?;
            }
        }
    }
    Ok(())
}
