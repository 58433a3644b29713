use std::collections::BTreeMap;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use takeoff_engine::{
    AuditReport, ElementId, EngineConfig, EntryFilter, FormulaCatalog, FormulaDefinition,
    FormulaId, FormulaOutcome, InMemoryEngine, InputSet, IntegrityReport, LedgerEntry,
    LedgerReader, ProjectId,
};
use takeoff_expr::Expression;
use takeoff_units::{conversion_factor, convert, Unit};

use crate::cli::*;
use crate::ledger_file::LedgerFile;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let format = cli.format;
    match cli.command {
        Command::Eval(args) => cmd_eval(args, format, &config),
        Command::Convert(args) => cmd_convert(args, format),
        Command::Catalog(args) => cmd_catalog(args, format, &config),
        Command::Calc(args) => cmd_calc(args, format, &config),
        Command::Log(args) => cmd_log(args, format),
        Command::Verify(args) => cmd_verify(args, format, &config),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_eval(args: EvalArgs, format: OutputFormat, config: &EngineConfig) -> anyhow::Result<()> {
    let expression = Expression::compile_with(&args.expression, &config.parse_limits())?;
    let variables: BTreeMap<String, f64> = args.vars.into_iter().collect();
    let value = expression.evaluate(&variables)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "expression": expression.source(),
            "variables": variables,
            "value": value,
        })),
        OutputFormat::Text => {
            println!("{} = {}", expression.source().dimmed(), value.to_string().bold());
            Ok(())
        }
    }
}

fn cmd_convert(args: ConvertArgs, format: OutputFormat) -> anyhow::Result<()> {
    let factor = conversion_factor(args.from, args.to)?;
    let value = convert(args.amount, args.from, args.to)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "amount": args.amount,
            "from": args.from,
            "to": args.to,
            "factor": factor.to_string(),
            "value": value,
        })),
        OutputFormat::Text => {
            println!(
                "{} {} = {} {}",
                args.amount,
                args.from,
                value.to_string().bold(),
                args.to
            );
            println!("  factor: {}", factor.to_string().dimmed());
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct FormulaView<'a> {
    #[serde(flatten)]
    formula: &'a FormulaDefinition,
    classifications: Vec<&'a str>,
}

fn cmd_catalog(args: CatalogArgs, format: OutputFormat, config: &EngineConfig) -> anyhow::Result<()> {
    let catalog = FormulaCatalog::load(&args.path, &config.parse_limits())?;
    let formulas: Vec<&FormulaDefinition> = match &args.classification {
        Some(classification) => catalog.for_classification(classification),
        None => catalog.iter().collect(),
    };

    match format {
        OutputFormat::Json => {
            let views: Vec<FormulaView> = formulas
                .into_iter()
                .map(|formula| FormulaView {
                    formula,
                    classifications: catalog.classifications_of(&formula.id).into_iter().collect(),
                })
                .collect();
            print_json(&views)
        }
        OutputFormat::Text => {
            println!(
                "{} {} formulas valid",
                "✓".green().bold(),
                catalog.len().to_string().bold()
            );
            for formula in formulas {
                let applies: Vec<&str> = catalog.classifications_of(&formula.id).into_iter().collect();
                println!(
                    "\n{} v{} -> {}  [{}]",
                    formula.id.as_str().yellow().bold(),
                    formula.version,
                    formula.output_unit,
                    applies.join(", ")
                );
                if !formula.description.is_empty() {
                    println!("  {}", formula.description);
                }
                println!("  {}", formula.expression.cyan());
                for input in &formula.inputs {
                    let constraint = if input.constraint.is_unconstrained() {
                        String::new()
                    } else {
                        format!("  ({})", input.constraint.describe(&input.name))
                    };
                    println!("    {} [{}]{}", input.name, input.unit, constraint.dimmed());
                }
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct OutcomeView {
    formula_id: FormulaId,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<Unit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
}

impl From<&FormulaOutcome> for OutcomeView {
    fn from(outcome: &FormulaOutcome) -> Self {
        let (amount, unit, error) = match &outcome.result {
            Ok(stored) => (Some(stored.result.amount), Some(stored.result.unit), None),
            Err(err) => (None, None, Some(err.to_string())),
        };
        Self {
            formula_id: outcome.formula_id.clone(),
            ok: outcome.is_success(),
            amount,
            unit,
            error,
            seq: outcome.entry.map(|e| e.seq),
        }
    }
}

fn selected_formulas<'a>(
    catalog: &'a FormulaCatalog,
    args: &CalcArgs,
) -> anyhow::Result<Vec<&'a FormulaDefinition>> {
    let mut formulas = match &args.classification {
        Some(classification) => catalog.for_classification(classification),
        None => Vec::new(),
    };
    for id in &args.formulas {
        let formula = catalog
            .get(&FormulaId::new(id.as_str()))
            .with_context(|| format!("formula {id} is not in the catalog"))?;
        if !formulas.iter().any(|f| f.id == formula.id) {
            formulas.push(formula);
        }
    }
    if formulas.is_empty() {
        bail!("no formulas selected");
    }
    Ok(formulas)
}

fn cmd_calc(args: CalcArgs, format: OutputFormat, config: &EngineConfig) -> anyhow::Result<()> {
    let catalog = FormulaCatalog::load(&args.catalog, &config.parse_limits())?;
    let formulas = selected_formulas(&catalog, &args)?;
    let project = ProjectId::parse(&args.project)?;
    let element = ElementId::parse(&args.element)?;
    let inputs: InputSet = args.inputs.iter().cloned().collect();

    let engine = LedgerFile::load(&args.ledger)?.into_engine(config.clone());
    let report = engine.verify_ledger(&project)?;
    if let Some(violation) = report.violations.first() {
        bail!(
            "ledger {} fails verification for project {project} at seq {}: {}; run `takeoff verify` before recording",
            args.ledger.display(),
            violation.seq,
            violation.description
        );
    }
    let outcomes = engine.calculate_for_element(&project, &element, &inputs, formulas);
    LedgerFile::from_engine(&engine)?.save(&args.ledger)?;

    let views: Vec<OutcomeView> = outcomes.iter().map(OutcomeView::from).collect();
    match format {
        OutputFormat::Json => print_json(&views),
        OutputFormat::Text => {
            println!("{} {}", "Element".bold(), element.as_str().yellow());
            for (outcome, view) in outcomes.iter().zip(&views) {
                let seq = view.seq.map(|s| format!("#{s}")).unwrap_or_default();
                match &outcome.result {
                    Ok(stored) => {
                        println!(
                            "  {} {} = {} {}  {}",
                            "✓".green(),
                            outcome.formula_id,
                            stored.result.amount.to_string().bold(),
                            stored.result.unit,
                            seq.dimmed()
                        );
                        for step in &stored.result.steps {
                            println!("      {} = {} {}", step.label.dimmed(), step.value, step.unit);
                        }
                    }
                    Err(err) => println!(
                        "  {} {}: {}  {}",
                        "✗".red(),
                        outcome.formula_id,
                        err.to_string().red(),
                        seq.dimmed()
                    ),
                }
            }
            Ok(())
        }
    }
}

fn selected_projects(engine: &InMemoryEngine, project: Option<&str>) -> anyhow::Result<Vec<ProjectId>> {
    Ok(match project {
        Some(project) => vec![ProjectId::parse(project)?],
        None => engine.ledger().projects()?,
    })
}

fn log_filter(args: &LogArgs) -> EntryFilter {
    let mut filter = EntryFilter::new();
    for kind in &args.kind {
        filter = filter.kind(*kind);
    }
    if let Some(element) = &args.element {
        filter = filter.element(ElementId::new(element.as_str()));
    }
    if let Some(formula) = &args.formula {
        filter = filter.formula(FormulaId::new(formula.as_str()));
    }
    if let Some(seq) = args.from_seq {
        filter = filter.from_seq(seq);
    }
    filter
}

fn cmd_log(args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let engine = LedgerFile::load(&args.ledger)?.into_engine(EngineConfig::default());
    let filter = log_filter(&args);

    let mut selected: Vec<LedgerEntry> = Vec::new();
    for project in selected_projects(&engine, args.project.as_deref())? {
        let mut entries = engine.entries_for(&project, &filter)?;
        if let Some(limit) = args.limit {
            let skip = entries.len().saturating_sub(limit);
            entries = entries.split_off(skip);
        }
        selected.extend(entries);
    }

    match format {
        OutputFormat::Json => print_json(&selected),
        OutputFormat::Text => {
            if selected.is_empty() {
                println!("No ledger entries.");
            }
            for entry in &selected {
                let kind = if entry.kind.is_failure() {
                    entry.kind.as_str().red()
                } else {
                    entry.kind.as_str().green()
                };
                println!(
                    "{} {:>4}  {}  {:<18} {}",
                    entry.project.as_str().cyan(),
                    entry.seq.to_string().yellow(),
                    entry.digest.short_hex().dimmed(),
                    kind,
                    entry.event.summary()
                );
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct VerifyView {
    integrity: IntegrityReport,
    audit: AuditReport,
}

fn cmd_verify(args: VerifyArgs, format: OutputFormat, config: &EngineConfig) -> anyhow::Result<()> {
    let engine = LedgerFile::load(&args.ledger)?.into_engine(config.clone());

    let mut views = Vec::new();
    for project in selected_projects(&engine, args.project.as_deref())? {
        views.push(VerifyView {
            integrity: engine.verify_ledger(&project)?,
            audit: engine.audit_results(&project)?,
        });
    }
    let failed = views
        .iter()
        .filter(|v| !v.integrity.is_intact() || !v.audit.is_consistent())
        .count();

    match format {
        OutputFormat::Json => print_json(&views)?,
        OutputFormat::Text => {
            if views.is_empty() {
                println!("No ledger entries.");
            }
            for view in &views {
                let report = &view.integrity;
                if report.is_intact() {
                    println!(
                        "{} {}: {} entries, chain intact",
                        "✓".green().bold(),
                        report.project.as_str().cyan(),
                        report.entry_count
                    );
                } else {
                    println!(
                        "{} {}: {} entries, {} violations",
                        "✗".red().bold(),
                        report.project.as_str().cyan(),
                        report.entry_count,
                        report.violations.len().to_string().red()
                    );
                    for violation in &report.violations {
                        println!("  seq {}: {}", violation.seq, violation.description);
                    }
                }
                for finding in &view.audit.findings {
                    println!(
                        "  {} result {}: {}",
                        "!".yellow().bold(),
                        finding.result_id,
                        finding.description
                    );
                }
            }
        }
    }

    if failed > 0 {
        bail!("{failed} project(s) failed verification");
    }
    Ok(())
}
