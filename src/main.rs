// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use std::env;
use std::path::Path;

use loan_servicing::{
    calculator, count_rows, load_loans_csv, open_database, schema, Config, SchemaValidator,
};
use loan_servicing::db::{get_loan, get_loan_by_number, insert_loan, is_constraint_violation};
use loan_servicing::logging::init_logging;

fn main() -> Result<()> {
    init_logging("warn");
    let config = Config::from_env();
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config),
        Some("import") => {
            let path = args.get(2).ok_or_else(|| anyhow!("usage: loan-servicing import <loans.csv>"))?;
            run_import(&config, Path::new(path))
        }
        Some("calc") => run_calc(&args[2..]),
        Some("schedule") => {
            let key = args.get(2).ok_or_else(|| anyhow!("usage: loan-servicing schedule <loan_number|id>"))?;
            run_schedule(&config, key)
        }
        Some("ui") | None => run_ui_mode(&config),
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {}", other)
        }
    }
}

fn print_usage() {
    println!("loan-servicing {}", loan_servicing::VERSION);
    println!();
    println!("USAGE:");
    println!("  loan-servicing init                                   create/upgrade the database");
    println!("  loan-servicing import <loans.csv>                     import loans from CSV");
    println!("  loan-servicing calc <principal> <rate%> <months> [YYYY-MM-DD]");
    println!("  loan-servicing schedule <loan_number|id>              amortization schedule");
    println!("  loan-servicing ui                                     portfolio browser (default)");
}

fn run_init(config: &Config) -> Result<()> {
    println!("🔧 Setting up database at {}", config.database_path.display());
    let conn = open_database(&config.database_path)?;

    for table in ["borrowers", "lenders", "properties", "loans", "draws", "payments"] {
        println!("  {:<12} {:>6} rows", table, count_rows(&conn, table)?);
    }
    println!("✓ Database initialized with WAL mode");

    Ok(())
}

fn run_import(config: &Config, csv_path: &Path) -> Result<()> {
    println!("🗄️  Loan Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let loans = load_loans_csv(csv_path)?;
    println!("✓ Loaded {} loans from {}", loans.len(), csv_path.display());

    // 2. Open database
    let conn = open_database(&config.database_path)?;
    let validator = SchemaValidator::new();

    // 3. Validate + insert
    println!("\n💾 Inserting loans...");
    let mut inserted = 0;
    let mut rejected = 0;
    let mut duplicates = 0;

    for loan in &loans {
        if let Err(errors) = validator.validate_loan(loan) {
            rejected += 1;
            println!("✗ {}: {}", loan.loan_number, schema::describe(&errors));
            continue;
        }

        match insert_loan(&conn, loan, &config.actor) {
            Ok(()) => inserted += 1,
            Err(e) if is_constraint_violation(&e) => {
                duplicates += 1;
                println!("✗ {}: duplicate loan number or unknown borrower/lender/property", loan.loan_number);
            }
            Err(e) => return Err(e),
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Inserted: {}", inserted);
    println!("✓ Rejected by validation: {}", rejected);
    println!("✓ Skipped (constraint): {}", duplicates);
    println!("✓ Database contains {} loans", count_rows(&conn, "loans")?);

    Ok(())
}

fn run_calc(args: &[String]) -> Result<()> {
    if args.len() < 3 {
        bail!("usage: loan-servicing calc <principal> <rate%> <months> [YYYY-MM-DD]");
    }

    let principal: f64 = args[0].parse().context("principal must be a number")?;
    let rate: f64 = args[1].parse().context("rate must be a number")?;
    let term: i32 = args[2].parse().context("months must be a whole number")?;
    let origination = match args.get(3) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").context("date must be YYYY-MM-DD")?,
        None => Local::now().date_naive(),
    };

    let payment = calculator::monthly_payment(principal, rate, term);

    println!("🧮 {:.2} at {}% for {} months", principal, rate, term);
    println!("  Monthly payment:  {:>14.2}", payment);
    println!("  Total interest:   {:>14.2}", calculator::total_interest(principal, payment, term));
    println!("  Total paid:       {:>14.2}", payment * term as f64);
    println!("  Originated:       {:>14}", origination);
    println!("  Matures:          {:>14}", calculator::maturity_date(origination, term));

    Ok(())
}

fn run_schedule(config: &Config, key: &str) -> Result<()> {
    let conn = open_database(&config.database_path)?;

    let loan = match get_loan_by_number(&conn, key)? {
        Some(loan) => loan,
        None => get_loan(&conn, key)?.ok_or_else(|| anyhow!("Loan not found: {}", key))?,
    };

    println!(
        "📄 {}  {:.2} at {}% / {} months  (payment {:.2})",
        loan.loan_number,
        loan.principal,
        loan.interest_rate,
        loan.term_months,
        loan.monthly_payment()
    );
    println!("{:>4}  {:<10}  {:>12}  {:>12}  {:>12}  {:>14}", "#", "Due", "Payment", "Interest", "Principal", "Balance");

    for row in loan.schedule() {
        println!(
            "{:>4}  {:<10}  {:>12.2}  {:>12.2}  {:>12.2}  {:>14.2}",
            row.period, row.due_date, row.payment, row.interest, row.principal, row.balance
        );
    }

    println!("Total interest: {:.2}", loan.total_interest());

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading loan portfolio...\n");

    if !config.database_path.exists() {
        eprintln!("❌ Database not found at {}", config.database_path.display());
        eprintln!("   Run: loan-servicing init");
        std::process::exit(1);
    }

    let conn = open_database(&config.database_path)?;
    let mut app = ui::App::load(&conn, Local::now().date_naive())?;

    println!("✓ Loaded {} loans\n", app.rows.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin loan-server --features server");
    std::process::exit(1);
}
