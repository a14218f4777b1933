// Expense Audit - command line
// Thin shell: parse arguments, call the library, print the result

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use expense_audit::validator::parse_amount;
use expense_audit::{
    AtomicWriter, AuditConfig, AuditEngine, AuditPass, AuditReport, Config, ExpenseLedger, FsAtomicWriter,
    MutationError, Record, RecordFields, RecordId, RecordPatch,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "expense-audit", version, about = "Audit an expense CSV for fraud indicators")]
struct Cli {
    /// Expense dataset (CSV)
    csv: PathBuf,

    /// JSON config file (column names, date format, audit options)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Same vendor + amount within a date window
    FindDuplicates {
        /// Max days between duplicates
        #[arg(long)]
        window: Option<u32>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Transactions dated on a Saturday or Sunday
    FlagWeekends {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Amounts over (or just under) the policy limit
    FlagThreshold {
        #[arg(long, value_parser = money)]
        limit: Option<Decimal>,
        #[arg(long, value_parser = money)]
        buffer: Option<Decimal>,
        #[arg(long = "limit-print", default_value_t = 20)]
        limit_print: usize,
    },
    /// Leading-digit distribution vs Benford's Law
    BenfordAnalysis {
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Vendor/description keyword scan
    SuspiciousKeywords {
        /// Replace the keyword list (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Paid amount differs from billed amount
    PaymentDiscrepancies {
        #[arg(long, value_parser = money)]
        tolerance: Option<Decimal>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run every pass
    AuditAll {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write one pass's findings to a CSV file
    Export { pass: AuditPass, out: PathBuf },
    /// Record count, totals and date range
    Summary,
    /// List records
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Show one record
    Show { id: RecordId },
    /// Add a record
    Add {
        #[arg(long)]
        date: String,
        #[arg(long)]
        vendor: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        paid: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Update fields of a record (omitted flags keep their value)
    Update {
        id: RecordId,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        /// Empty string clears the paid amount
        #[arg(long)]
        paid: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a record
    Delete { id: RecordId },
}

fn money(raw: &str) -> Result<Decimal, String> {
    parse_amount("value", raw).map_err(|e| e.reason)
}

fn main() -> ExitCode {
    expense_audit::init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let ledger = ExpenseLedger::open(&cli.csv, config.dataset.clone())
        .with_context(|| format!("could not load {}", cli.csv.display()))?;

    let json = cli.json;
    let snapshot = ledger.snapshot();

    let limit = apply_overrides(&cli.cmd, &mut config.audit);
    let engine = AuditEngine::new(config.audit.clone().validated()?);

    let pass = match &cli.cmd {
        Command::FindDuplicates { .. } => Some(AuditPass::Duplicates),
        Command::FlagWeekends { .. } => Some(AuditPass::Weekends),
        Command::FlagThreshold { .. } => Some(AuditPass::HighValue),
        Command::BenfordAnalysis { .. } => Some(AuditPass::Benford),
        Command::SuspiciousKeywords { .. } => Some(AuditPass::Keywords),
        Command::PaymentDiscrepancies { .. } => Some(AuditPass::Discrepancies),
        _ => None,
    };
    if let Some(pass) = pass {
        print_report(&engine.run(pass, &snapshot), limit, json)?;
        return Ok(ExitCode::SUCCESS);
    }

    match cli.cmd {
        Command::AuditAll { .. } => {
            let reports = engine.run_all(&snapshot);
            if json {
                print_json(&reports)?;
            } else {
                println!("🔎 Audit of {} ({} records)", cli.csv.display(), snapshot.len());
                for report in &reports {
                    println!();
                    print!("{}", report.render_text(Some(limit)));
                }
            }
        }
        Command::Export { pass, out } => {
            let report = engine.run(pass, &snapshot);
            let bytes = report.to_csv().context("could not render findings")?;
            FsAtomicWriter.write_atomic(&out, &bytes)?;
            println!("✓ Wrote {} findings to {}", report.findings.len(), out.display());
        }
        Command::Summary => {
            let summary = snapshot.summary();
            if json {
                print_json(&summary)?;
            } else {
                println!("📊 {}", cli.csv.display());
                println!("   Records:      {}", summary.record_count);
                println!("   Total amount: {}", money_label(summary.total_amount));
                println!("   Total paid:   {}", money_label(summary.total_paid));
                println!("   Unreconciled: {}", summary.unreconciled_count);
                println!("   Date range:   {}", summary.date_range());
                println!("   Fingerprint:  {}", ledger.fingerprint());
            }
        }
        Command::List { offset, limit } => {
            let page = snapshot.page(offset, limit);
            if json {
                print_json(&page)?;
            } else {
                println!("Records {}-{} of {}", page.offset + 1, page.offset + page.records.len(), page.total);
                for record in &page.records {
                    println!("{}", format_record(record));
                }
            }
        }
        Command::Show { id } => match ledger.get(id) {
            Some(record) => print_record(&record, json)?,
            None => {
                eprintln!("❌ Record {} not found", id);
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Add {
            date,
            vendor,
            amount,
            paid,
            description,
        } => {
            let fields = RecordFields {
                date,
                vendor,
                amount,
                paid_amount: paid,
                description,
            };
            return report_mutation("added", ledger.add(&fields), json);
        }
        Command::Update {
            id,
            date,
            vendor,
            amount,
            paid,
            description,
        } => {
            let patch = RecordPatch {
                date,
                vendor,
                amount,
                paid_amount: paid,
                description,
            };
            return report_mutation("updated", ledger.update(id, &patch), json);
        }
        Command::Delete { id } => {
            return report_mutation("deleted", ledger.delete(id), json);
        }
        _ => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// Copy per-command flags onto the audit options; returns how many
/// findings the text output shows
fn apply_overrides(cmd: &Command, audit: &mut AuditConfig) -> usize {
    match cmd {
        Command::FindDuplicates { window, limit } => {
            if let Some(w) = window {
                audit.duplicate_window_days = *w;
            }
            *limit
        }
        Command::FlagThreshold {
            limit,
            buffer,
            limit_print,
        } => {
            if let Some(l) = limit {
                audit.high_value_limit = *l;
            }
            if let Some(b) = buffer {
                audit.near_limit_buffer = *b;
            }
            *limit_print
        }
        Command::BenfordAnalysis { threshold, limit } => {
            if let Some(t) = threshold {
                audit.benford_deviation_threshold = *t;
            }
            *limit
        }
        Command::SuspiciousKeywords { keywords, limit } => {
            if !keywords.is_empty() {
                audit.keyword_list = keywords.clone();
            }
            *limit
        }
        Command::PaymentDiscrepancies { tolerance, limit } => {
            if let Some(t) = tolerance {
                audit.discrepancy_tolerance = *t;
            }
            *limit
        }
        Command::FlagWeekends { limit } | Command::AuditAll { limit } => *limit,
        _ => 0,
    }
}

/// Mutation errors are expected outcomes: print them, exit non-zero
fn report_mutation(
    verb: &str,
    result: Result<Record, MutationError>,
    json: bool,
) -> Result<ExitCode> {
    match result {
        Ok(record) => {
            if json {
                print_json(&record)?;
            } else {
                println!("✓ Record {} {}", record.id, verb);
                println!("{}", format_record(&record));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(MutationError::Persistence(e)) => {
            eprintln!("❌ Failed to save, nothing changed: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_report(report: &AuditReport, limit: usize, json: bool) -> Result<()> {
    if json {
        print_json(report)
    } else {
        print!("{}", report.render_text(Some(limit)));
        Ok(())
    }
}

fn print_record(record: &Record, json: bool) -> Result<()> {
    if json {
        print_json(record)
    } else {
        println!("{}", format_record(record));
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn money_label(total: Option<Decimal>) -> String {
    total
        .map(|t| format!("${}", t))
        .unwrap_or_else(|| "N/A (overflow)".to_string())
}

fn format_record(r: &Record) -> String {
    let paid = r
        .paid_amount
        .map(|p| format!("${}", p))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<5} {} | {} | ${} | paid {} | {}",
        r.id, r.date, r.vendor, r.amount, paid, r.description
    )
}
