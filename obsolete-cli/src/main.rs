use clap::Parser;
use obsolete::config::get_config;
use obsolete::repl::Repl;
use obsolete::vm::{Stats, VMOptions};
use std::io::{BufRead, BufWriter, Write};
use std::time::Duration;

/// Run an obsolete program: a line count, followed by that many lines of code.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// File containing the program. Reads standard input if missing.
    #[arg()]
    file: Option<String>,
    /// Maximum stack size.
    #[arg(long, short = 'm', default_value_t = usize::MAX)]
    max_stack_size: usize,
    /// A limit for the number of executed instructions.
    /// If the limit is reached, the program will be stopped with an error.
    #[arg(long, short = 'l')]
    op_limit: Option<u64>,
    /// A limit for nested function calls. Defaults to $OBSOLETE_MAX_CALL_DEPTH, or no limit.
    #[arg(long, short = 'd')]
    max_depth: Option<usize>,
    /// Print statistics after running the program.
    #[arg(long, short = 's')]
    stats: bool,
    /// Print the parsed instructions of every line to stderr.
    #[arg(long)]
    ir: bool,
}

fn open_input(file: Option<&str>) -> Result<Box<dyn BufRead>, anyhow::Error> {
    Ok(match file {
        Some(file) => Box::new(std::io::BufReader::new(std::fs::File::open(file)?)),
        None => Box::new(std::io::stdin().lock()),
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let input = open_input(args.file.as_deref())?;
    let max_depth = args.max_depth.or(get_config().max_call_depth);
    let options = VMOptions::new(
        &[],
        args.max_stack_size,
        args.op_limit.unwrap_or(u64::MAX),
        max_depth.unwrap_or(usize::MAX),
    );

    let stdout = std::io::stdout();
    let mut repl = Repl::with_options(BufWriter::new(stdout.lock()), options, Stats::default());
    repl.set_dump_ir(args.ir);

    let start_time = std::time::Instant::now();
    let result = repl.connect_with(input);
    let elapsed = start_time.elapsed();

    if args.stats {
        print_stats(repl.tracer(), elapsed);
    }
    let (mut out, _) = repl.into_parts();
    out.flush()?;

    result?;
    Ok(())
}

fn print_stats(stats: &Stats, elapsed: Duration) {
    let instructions_per_second = stats.instructions as f64 / elapsed.as_secs_f64();
    eprintln!("Execution time: {:?}", elapsed);
    eprintln!(
        "Instructions executed: {} ({}/s)",
        stats.instructions,
        match instructions_per_second {
            n if n >= 1_000_000.0 => format!("{:.1}M", n / 1_000_000.0),
            n if n >= 1_000.0 => format!("{:.1}k", n / 1_000.0),
            n => format!("{:.1}", n),
        }
    );
    eprintln!("Function calls: {} (max depth {})", stats.calls, stats.max_call_depth);
    eprintln!("Values printed: {}", stats.outputs);
    eprintln!("Max stack size: {}", stats.max_stack_len);
}
