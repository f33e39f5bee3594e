//! CLI integration tests: argument parsing, settings loading from INI files,
//! and command output against a desk wired to scripted sources.

mod common;

use clap::Parser;
use common::*;
use etfdesk::cli::{self, CacheCommand, Cli, Command, PortfolioCommand};
use etfdesk::domain::desk::EtfDesk;
use etfdesk::domain::error::EtfDeskError;
use etfdesk::domain::raw::EtfListing;
use etfdesk::ports::source_port::{SourcePort, SourceTier};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn run_command(desk: &mut EtfDesk, command: Command) -> Result<String, EtfDeskError> {
    let mut out = Vec::new();
    cli::execute(desk, &command, &mut out)?;
    Ok(String::from_utf8(out).unwrap())
}

fn scripted_desk(dir: &std::path::Path) -> EtfDesk {
    let clock = Arc::new(ManualClock::at(date(2024, 3, 1)));
    let source: Arc<dyn SourcePort> = Arc::new(
        ScriptedSource::new("primary", SourceTier::Primary)
            .with_series("SPY", bars_from_closes(date(2024, 1, 1), &rising_closes(60, 100.0, 0.5)))
            .with_listing(
                "A",
                vec![EtfListing {
                    symbol: "510300".into(),
                    name: "CSI 300 ETF".into(),
                }],
            ),
    );
    desk_with(vec![source], clock, dir)
}

const VALID_INI: &str = r#"
[data]
cache_dir = /tmp/etfdesk-cache
cache_expiry_hours = 12
min_rows = 40
outlier_detection = on

[sources]
primary_enabled = false
csv_dir = /srv/mirror

[indicators]
ma_periods = 10, 20, 60

[signals]
max_drawdown_threshold = 0.15

[portfolio]
default_rebalance_threshold = 0.1

[logging]
level = debug
"#;

mod settings_loading {
    use super::*;

    #[test]
    fn valid_file_overrides_defaults() {
        let file = write_temp_ini(VALID_INI);
        let settings = cli::load_settings(Some(file.path())).unwrap();

        assert_eq!(settings.data.cache_expiry_hours, 12);
        assert_eq!(settings.data.min_rows, 40);
        assert!(settings.data.outlier_detection);
        assert!(!settings.sources.primary_enabled);
        assert_eq!(settings.sources.csv_dir.as_deref(), Some(std::path::Path::new("/srv/mirror")));
        assert_eq!(settings.indicators.ma_periods, vec![10, 20, 60]);
        assert_eq!(settings.signals.max_drawdown_threshold, 0.15);
        assert_eq!(settings.portfolio.default_rebalance_threshold, 0.1);
        assert_eq!(settings.log_level.as_deref(), Some("debug"));
        assert_eq!(settings.orchestrator_config().series_ttl, chrono::Duration::hours(12));
    }

    #[test]
    fn missing_file_is_parse_error() {
        let err = cli::load_settings(Some(std::path::Path::new("/nonexistent/etfdesk.ini"))).unwrap_err();
        assert!(matches!(err, EtfDeskError::ConfigParse { .. }));
        assert_eq!(format!("{:?}", ExitCode::from(&err)), format!("{:?}", ExitCode::from(2)));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let file = write_temp_ini("[data]\nmax_retries = 0\n");
        match cli::load_settings(Some(file.path())) {
            Err(EtfDeskError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "data");
                assert_eq!(key, "max_retries");
            }
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn too_few_ma_periods_are_rejected() {
        let file = write_temp_ini("[indicators]\nma_periods = 5,20\n");
        assert!(matches!(
            cli::load_settings(Some(file.path())),
            Err(EtfDeskError::ConfigInvalid { .. })
        ));
    }
}

mod argument_parsing {
    use super::*;

    #[test]
    fn assignments_split_on_commas_and_uppercase() {
        let parsed = cli::parse_assignments(&["spy=0.6,qqq=0.3".to_string(), "IWM = 0.1".to_string()]).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["SPY"], 0.6);
        assert_eq!(parsed["QQQ"], 0.3);
        assert_eq!(parsed["IWM"], 0.1);
    }

    #[test]
    fn malformed_assignment_is_validation_error() {
        assert!(matches!(
            cli::parse_assignments(&["SPY".to_string()]),
            Err(EtfDeskError::Validation { .. })
        ));
        assert!(matches!(
            cli::parse_assignments(&["SPY=lots".to_string()]),
            Err(EtfDeskError::Validation { .. })
        ));
    }

    #[test]
    fn rebalance_flags_parse() {
        let cli = Cli::try_parse_from([
            "etfdesk",
            "-c",
            "desk.ini",
            "portfolio",
            "rebalance",
            "--holding",
            "SPY=10",
            "--holding",
            "QQQ=5",
            "--price",
            "SPY=100,QQQ=50",
            "--threshold",
            "0.02",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("desk.ini")));
        match cli.command {
            Command::Portfolio {
                action:
                    PortfolioCommand::Rebalance {
                        holdings,
                        prices,
                        threshold,
                        json,
                    },
            } => {
                assert_eq!(holdings, vec!["SPY=10", "QQQ=5"]);
                assert_eq!(prices, vec!["SPY=100,QQQ=50"]);
                assert_eq!(threshold, Some(0.02));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn list_defaults_to_mainland_market() {
        let cli = Cli::try_parse_from(["etfdesk", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List { market } if market == "A"));
    }

    #[test]
    fn set_weights_requires_values() {
        assert!(Cli::try_parse_from(["etfdesk", "portfolio", "set-weights"]).is_err());
    }
}

mod commands {
    use super::*;

    #[test]
    fn fetch_prints_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let out = run_command(
            &mut desk,
            Command::Fetch {
                symbol: "spy".into(),
                start: Some("2024-01-01".into()),
                end: Some("2024-01-31".into()),
                json: false,
            },
        )
        .unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "date,open,high,low,close,volume");
        assert_eq!(lines.len(), 32);
        assert_eq!(lines[1], "2024-01-01,100,100.5,99.5,100,1000");
    }

    #[test]
    fn fetch_json_is_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let out = run_command(
            &mut desk,
            Command::Fetch {
                symbol: "SPY".into(),
                start: Some("2024-01-01".into()),
                end: Some("2024-01-31".into()),
                json: true,
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["symbol"], "SPY");
        assert_eq!(value["bars"].as_array().unwrap().len(), 31);
    }

    #[test]
    fn list_prints_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let out = run_command(&mut desk, Command::List { market: "a".into() }).unwrap();
        assert_eq!(out, "510300\tCSI 300 ETF\n");
    }

    #[test]
    fn signal_explains_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let out = run_command(
            &mut desk,
            Command::Signal {
                symbol: "SPY".into(),
                json: false,
            },
        )
        .unwrap();
        assert!(out.starts_with("SPY buy signal: ALLOW"));
        assert!(out.contains("reasons:"));
    }

    #[test]
    fn sources_lists_health() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let out = run_command(
            &mut desk,
            Command::Sources {
                probe: false,
                json: false,
            },
        )
        .unwrap();
        assert!(out.starts_with("1. primary ["));
        assert!(out.trim_end().ends_with("available"));
    }

    #[test]
    fn portfolio_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());

        let out = run_command(&mut desk, Command::Portfolio { action: PortfolioCommand::Show }).unwrap();
        assert_eq!(out, "no portfolio configured\n");

        run_command(
            &mut desk,
            Command::Portfolio {
                action: PortfolioCommand::SetWeights {
                    weights: vec!["spy=0.5".into(), "qqq=0.5".into()],
                },
            },
        )
        .unwrap();

        let out = run_command(&mut desk, Command::Portfolio { action: PortfolioCommand::Show }).unwrap();
        assert!(out.contains("QQQ\t50.00%"));
        assert!(out.contains("total weight: 100.00%"));
        assert!(out.contains("rebalance threshold: 5.00%"));

        let out = run_command(
            &mut desk,
            Command::Portfolio {
                action: PortfolioCommand::Rebalance {
                    holdings: vec!["SPY=62".into(), "QQQ=38".into()],
                    prices: vec!["SPY=1,QQQ=1".into()],
                    threshold: None,
                    json: false,
                },
            },
        )
        .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "portfolio value: 100.00");
        assert_eq!(lines.len(), 4);
        assert!(lines.contains(&"QQQ\tBUY\t38.00%\t50.00%\t12.00%\t12.00"));
        assert!(lines.contains(&"SPY\tSELL\t62.00%\t50.00%\t12.00%\t12.00"));
    }

    #[test]
    fn weights_not_summing_to_one_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let err = run_command(
            &mut desk,
            Command::Portfolio {
                action: PortfolioCommand::SetWeights {
                    weights: vec!["SPY=0.5,QQQ=0.3".into()],
                },
            },
        )
        .unwrap_err();
        assert!(matches!(err, EtfDeskError::Configuration { .. }));
        assert!(desk.get_portfolio_config().is_none());
    }

    #[test]
    fn cache_clear_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        desk.get_etf_data("SPY", "2024-01-01", "2024-01-31").unwrap();

        let out = run_command(&mut desk, Command::Cache { action: CacheCommand::Info }).unwrap();
        assert!(out.starts_with("entries: 1\n"));

        let out = run_command(&mut desk, Command::Cache { action: CacheCommand::Clear }).unwrap();
        assert_eq!(out, "removed 1 cache entries\n");
        let out = run_command(&mut desk, Command::Cache { action: CacheCommand::Clear }).unwrap();
        assert_eq!(out, "removed 0 cache entries\n");
    }

    #[test]
    fn failures_map_to_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let mut desk = scripted_desk(dir.path());
        let err = run_command(
            &mut desk,
            Command::Fetch {
                symbol: "SPY".into(),
                start: Some("2030-01-01".into()),
                end: Some("2030-02-01".into()),
                json: false,
            },
        )
        .unwrap_err();
        assert_eq!(format!("{:?}", ExitCode::from(&err)), format!("{:?}", ExitCode::from(3)));

        let err = run_command(&mut desk, Command::List { market: "HK".into() }).unwrap_err();
        assert_eq!(format!("{:?}", ExitCode::from(&err)), format!("{:?}", ExitCode::from(4)));
    }
}
