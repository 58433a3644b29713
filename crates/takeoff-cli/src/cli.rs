use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use takeoff_ledger::EventKind;
use takeoff_units::{Quantity, Unit};

#[derive(Parser)]
#[command(
    name = "takeoff",
    about = "Takeoff: deterministic quantity calculation with a tamper-evident ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate a formula expression
    Eval(EvalArgs),
    /// Convert an amount between units
    Convert(ConvertArgs),
    /// Validate and list a formula catalog
    Catalog(CatalogArgs),
    /// Calculate quantities for one element and record them in a ledger
    Calc(CalcArgs),
    /// Show ledger entries
    Log(LogArgs),
    /// Verify ledger chain integrity
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct EvalArgs {
    pub expression: String,
    /// Variable binding, e.g. `--var length=5`
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, f64)>,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[arg(allow_negative_numbers = true)]
    pub amount: f64,
    pub from: Unit,
    pub to: Unit,
}

#[derive(Args)]
pub struct CatalogArgs {
    pub path: PathBuf,
    /// Only list formulas for this classification
    #[arg(long)]
    pub classification: Option<String>,
}

#[derive(Args)]
pub struct CalcArgs {
    #[arg(long)]
    pub catalog: PathBuf,
    #[arg(long, default_value = "takeoff-ledger.json")]
    pub ledger: PathBuf,
    #[arg(long)]
    pub project: String,
    #[arg(long)]
    pub element: String,
    /// Run the catalog's formulas for this classification
    #[arg(long, required_unless_present = "formulas")]
    pub classification: Option<String>,
    /// Run these catalog formulas
    #[arg(long = "formula")]
    pub formulas: Vec<String>,
    /// Input value with unit, e.g. `--input length=5m` or `--input "area=12.5 m2"`
    #[arg(long = "input", value_parser = parse_input)]
    pub inputs: Vec<(String, Quantity)>,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(long, default_value = "takeoff-ledger.json")]
    pub ledger: PathBuf,
    /// Limit to one project
    #[arg(long)]
    pub project: Option<String>,
    /// Only entries of these kinds
    #[arg(long)]
    pub kind: Vec<EventKind>,
    #[arg(long)]
    pub element: Option<String>,
    #[arg(long)]
    pub formula: Option<String>,
    /// Skip entries before this sequence number
    #[arg(long)]
    pub from_seq: Option<u64>,
    /// Show at most this many entries per project, newest last
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(long, default_value = "takeoff-ledger.json")]
    pub ledger: PathBuf,
    /// Limit to one project
    #[arg(long)]
    pub project: Option<String>,
}

/// Parse `name=value`.
pub fn parse_var(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = split_binding(raw)?;
    let value = value
        .parse::<f64>()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((name, value))
}

/// Parse `name=<number><unit>`, with optional space before the unit.
///
/// The number may use an exponent (`1e3m`). Units that start with `e`
/// (`2ea`) are resolved by taking the longest numeric prefix that leaves a
/// known unit.
pub fn parse_input(raw: &str) -> Result<(String, Quantity), String> {
    let (name, value) = split_binding(raw)?;
    let numeric = value
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .unwrap_or(value.len());

    let mut first_error = None;
    for end in (1..=numeric).rev() {
        let Ok(number) = value[..end].parse::<f64>() else {
            continue;
        };
        let unit = value[end..].trim();
        if unit.is_empty() {
            first_error.get_or_insert_with(|| format!("input '{name}' has no unit"));
            continue;
        }
        match unit.parse::<Unit>() {
            Ok(unit) => return Ok((name, Quantity::new(number, unit))),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    Err(first_error.unwrap_or_else(|| format!("'{value}' is not a number")))
}

fn split_binding(raw: &str) -> Result<(String, &str), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing name in '{raw}'"));
    }
    Ok((name.to_string(), value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_eval_with_vars() {
        let cli = Cli::try_parse_from([
            "takeoff",
            "eval",
            "length * height",
            "--var",
            "length=5",
            "--var",
            "height=2.5",
        ])
        .unwrap();
        if let Command::Eval(args) = cli.command {
            assert_eq!(args.expression, "length * height");
            assert_eq!(args.vars, vec![("length".into(), 5.0), ("height".into(), 2.5)]);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_convert_units() {
        let cli = Cli::try_parse_from(["takeoff", "convert", "12", "ft", "m"]).unwrap();
        if let Command::Convert(args) = cli.command {
            assert_eq!(args.amount, 12.0);
            assert_eq!(args.from, Unit::Foot);
            assert_eq!(args.to, Unit::Metre);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_convert_rejects_unknown_unit() {
        assert!(Cli::try_parse_from(["takeoff", "convert", "1", "furlong", "m"]).is_err());
    }

    #[test]
    fn parse_calc() {
        let cli = Cli::try_parse_from([
            "takeoff",
            "calc",
            "--catalog",
            "formulas.toml",
            "--project",
            "tower-a",
            "--element",
            "wall-01",
            "--classification",
            "wall",
            "--input",
            "length=5m",
            "--input",
            "opening_area=1.5 m2",
        ])
        .unwrap();
        if let Command::Calc(args) = cli.command {
            assert_eq!(args.ledger, PathBuf::from("takeoff-ledger.json"));
            assert_eq!(args.classification.as_deref(), Some("wall"));
            assert_eq!(args.inputs[0], ("length".into(), Quantity::new(5.0, Unit::Metre)));
            assert_eq!(
                args.inputs[1],
                ("opening_area".into(), Quantity::new(1.5, Unit::SquareMetre))
            );
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_calc_needs_classification_or_formula() {
        let result = Cli::try_parse_from([
            "takeoff", "calc", "--catalog", "f.toml", "--project", "p", "--element", "e",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "takeoff", "calc", "--catalog", "f.toml", "--project", "p", "--element", "e",
            "--formula", "wall-net-area",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Calc(_)));
    }

    #[test]
    fn parse_log_filters() {
        let cli = Cli::try_parse_from([
            "takeoff",
            "log",
            "--kind",
            "validation-failed",
            "--kind",
            "created",
            "--from-seq",
            "3",
            "-n",
            "5",
        ])
        .unwrap();
        if let Command::Log(args) = cli.command {
            assert_eq!(args.kind, vec![EventKind::ValidationFailed, EventKind::Created]);
            assert_eq!(args.from_seq, Some(3));
            assert_eq!(args.limit, Some(5));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["takeoff", "verify", "--project", "tower-a"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.project.as_deref(), Some("tower-a"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "takeoff",
            "--verbose",
            "verify",
            "--format",
            "json",
            "--config",
            "engine.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
    }

    #[test]
    fn input_values_need_a_unit() {
        assert!(parse_input("length=5").is_err());
        assert!(parse_input("=5m").is_err());
        assert!(parse_input("length=5furlong").is_err());
        assert_eq!(
            parse_input("coats=2ea").unwrap(),
            ("coats".into(), Quantity::new(2.0, Unit::Each))
        );
        assert_eq!(
            parse_input("waste = 10 %").unwrap(),
            ("waste".into(), Quantity::new(10.0, Unit::Percent))
        );
    }

    #[test]
    fn input_values_accept_exponents() {
        assert_eq!(
            parse_input("length=1e3mm").unwrap(),
            ("length".into(), Quantity::new(1000.0, Unit::Millimetre))
        );
        assert_eq!(
            parse_input("area=2.5E-1 m2").unwrap(),
            ("area".into(), Quantity::new(0.25, Unit::SquareMetre))
        );
        assert_eq!(
            parse_input("studs=1e2ea").unwrap(),
            ("studs".into(), Quantity::new(100.0, Unit::Each))
        );
        assert!(parse_input("length=e3m").is_err());
    }

    #[test]
    fn vars_need_numbers() {
        assert!(parse_var("length").is_err());
        assert!(parse_var("length=abc").is_err());
        assert_eq!(parse_var("x=-1.5").unwrap(), ("x".into(), -1.5));
    }
}
