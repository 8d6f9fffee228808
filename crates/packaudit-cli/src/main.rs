use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use packaudit_core::{AuditConfig, PackageKind, Report, RuleSet, Severity, DEFAULT_RULES_YAML};
use packaudit_engine::{analyze, components_checked, validate};
use packaudit_sqlgen::{compare_script, generate};

/// PackAudit - compliance review for ETL packages
#[derive(Parser)]
#[command(name = "packaudit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: packaudit.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review a package against the property rules and shape checks
    Check {
        /// Path to the package document
        package: PathBuf,

        /// Kind of package under review (dimension or fact)
        #[arg(short, long)]
        kind: PackageKind,

        /// Rule file (default: property_rules.yml if present, else built-in)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Reviewed SQL script whose named sections are compared against
        /// the package's statements
        #[arg(long)]
        sql_script: Option<PathBuf>,

        /// Review-script template with {{placeholder}} markers
        #[arg(long)]
        sql_template: Option<PathBuf>,

        /// Output file for the rendered review script
        #[arg(long, default_value = "review.sql")]
        sql_output: PathBuf,
    },

    /// Write the default rule file
    InitRules {
        /// Destination path
        #[arg(default_value = "property_rules.yml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        AuditConfig::from_file(config_path)?
    } else if Path::new("packaudit.toml").exists() {
        AuditConfig::from_file(Path::new("packaudit.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        AuditConfig::default()
    };

    match cli.command {
        Commands::Check {
            package,
            kind,
            rules,
            output,
            sql_script,
            sql_template,
            sql_output,
        } => check_command(
            &config,
            &package,
            kind,
            rules.as_deref(),
            &output,
            sql_script.as_deref(),
            sql_template.as_deref(),
            &sql_output,
            cli.verbose,
        ),
        Commands::InitRules { path } => init_rules_command(&path),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Check command - load, validate, analyze, report
#[allow(clippy::too_many_arguments)]
fn check_command(
    config: &AuditConfig,
    package_path: &Path,
    kind: PackageKind,
    rules_path: Option<&Path>,
    output: &Path,
    sql_script: Option<&Path>,
    sql_template: Option<&Path>,
    sql_output: &Path,
    verbose: bool,
) -> Result<()> {
    let rules = match rules_path {
        Some(path) => RuleSet::from_file(path)?,
        None if Path::new("property_rules.yml").exists() => {
            RuleSet::from_file(Path::new("property_rules.yml"))?
        }
        None => RuleSet::from_yaml(DEFAULT_RULES_YAML)?,
    };

    if verbose {
        eprintln!(
            "{} {} property rules across {} component types",
            "Loaded".cyan(),
            rules.rule_count(),
            rules.type_tags().count()
        );
        eprintln!(
            "{} {} as a {} package",
            "Reviewing".cyan(),
            package_path.display(),
            kind
        );
    }

    let doc = packaudit_model::load(package_path, config)?;

    let mut findings = validate(&doc, &rules, kind, config);
    let outcome = analyze(&doc, config);
    findings.extend(outcome.findings);

    if let Some(script_path) = sql_script {
        let script = std::fs::read_to_string(script_path)?;
        findings.extend(compare_script(&script, &doc));
    }

    let mut report = Report::from_findings(&doc.name, findings);
    report.summary.pipelines_analyzed = outcome.pipelines.len();
    report.summary.components_checked = components_checked(&doc, &rules);

    report.save_to_file(output)?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    // A template mismatch aborts only the SQL step; findings stand.
    if let Some(template_path) = sql_template {
        let template = std::fs::read_to_string(template_path)?;
        match generate(&template, &outcome.metadata) {
            Ok(script) => {
                std::fs::write(sql_output, script)?;
                if verbose {
                    eprintln!(
                        "{} {}",
                        "Review script saved to:".green(),
                        sql_output.display()
                    );
                }
            }
            Err(e) => {
                eprintln!("{} {}", "SQL generation failed:".red().bold(), e);
            }
        }
    }

    print_report_summary(&report);

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Init-rules command - bootstrap the default rule file
fn init_rules_command(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow::anyhow!(
            "{} already exists, not overwriting",
            path.display()
        ));
    }
    std::fs::write(path, DEFAULT_RULES_YAML)?;
    println!(
        "{} {}",
        "Default rules written to".green(),
        path.display()
    );
    Ok(())
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Package Review Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Package: {}", report.package);
    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total findings: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!(
            "  Errors:   {}",
            format!("{}", report.summary.errors).red().bold()
        );
    } else {
        println!(
            "  Errors:   {}",
            format!("{}", report.summary.errors).green()
        );
    }

    if report.summary.warnings > 0 {
        println!(
            "  Warnings: {}",
            format!("{}", report.summary.warnings).yellow()
        );
    } else {
        println!(
            "  Warnings: {}",
            format!("{}", report.summary.warnings).green()
        );
    }

    println!("  Pipelines analyzed:  {}", report.summary.pipelines_analyzed);
    println!("  Components checked:  {}", report.summary.components_checked);
    println!();

    if report.findings.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Findings:".bold());
        for finding in &report.findings {
            let severity_str = match finding.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warning => "WARN".yellow().bold(),
            };

            println!("  [{}] {}: {}", severity_str, finding.code, finding.message);
            println!("    at {}", finding.subject.display_name());

            if let Some(expected) = &finding.expected {
                println!("    Expected: {expected}");
            }
            if let Some(actual) = &finding.actual {
                println!("    Actual:   {actual}");
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
