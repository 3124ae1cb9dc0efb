use remoteio_peer::{open_handle, OpenOptions, Whence};
use remoteio_transport::HandleTable;
use serde::Serialize;
use tracing::info;

use remoteio::demo::DemoServer;

use crate::cmd::{ExerciseArgs, MAX_EXERCISE_SIZE};
use crate::exit::{rio_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct OpCount {
    op: &'static str,
    count: u64,
}

#[derive(Serialize)]
struct ExerciseOutput {
    path: String,
    mode: &'static str,
    size: usize,
    written: usize,
    read: usize,
    verified: bool,
    transactions: Vec<OpCount>,
}

fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn run(args: ExerciseArgs, format: OutputFormat) -> CliResult<i32> {
    if args.size > MAX_EXERCISE_SIZE {
        return Err(CliError::new(
            USAGE,
            format!("size {} exceeds limit {MAX_EXERCISE_SIZE}", args.size),
        ));
    }

    let table_handles = HandleTable::new();
    let server = DemoServer::new();
    let (root, root_thread) = server
        .spawn_root(&table_handles)
        .map_err(|err| CliError::new(INTERNAL, format!("demo server failed to start: {err}")))?;

    let options = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .describe(args.describe);
    let file = open_handle(&root, &args.path, &options).map_err(|err| rio_error("open failed", err))?;

    let data = pattern(args.size);
    let written = file.write(&data).map_err(|err| rio_error("write failed", err))?;
    file.seek(0, Whence::Set)
        .map_err(|err| rio_error("seek failed", err))?;
    let mut back = vec![0u8; args.size];
    let read = file.read(&mut back).map_err(|err| rio_error("read failed", err))?;
    file.close().map_err(|err| rio_error("close failed", err))?;

    drop(root);
    if root_thread.join().is_err() {
        return Err(CliError::new(INTERNAL, "demo server thread panicked"));
    }

    let verified = written == args.size && read == args.size && back == data;
    info!(size = args.size, written, read, verified, "exercise finished");

    let out = ExerciseOutput {
        path: args.path,
        mode: if args.describe { "describe" } else { "pipelined" },
        size: args.size,
        written,
        read,
        verified,
        transactions: server
            .counts()
            .into_iter()
            .map(|(op, count)| OpCount { op, count })
            .collect(),
    };
    print_exercise(&out, format);

    if verified {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            DATA_INVALID,
            format!("read back {read} of {written} written bytes with mismatched content"),
        ))
    }
}

fn print_exercise(out: &ExerciseOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut t = table(vec!["OP", "TRANSACTIONS"]);
            for entry in &out.transactions {
                t.add_row(vec![entry.op.to_string(), entry.count.to_string()]);
            }
            println!(
                "{} ({}): wrote {} read {} verified={}",
                out.path, out.mode, out.written, out.read, out.verified
            );
            println!("{t}");
        }
        OutputFormat::Pretty => {
            println!("Exercise:");
            println!("  Path:      {}", out.path);
            println!("  Mode:      {}", out.mode);
            println!("  Written:   {}", out.written);
            println!("  Read:      {}", out.read);
            println!("  Verified:  {}", out.verified);
            let txns = out
                .transactions
                .iter()
                .map(|t| format!("{}={}", t.op, t.count))
                .collect::<Vec<_>>()
                .join(", ");
            println!("  Txns:      {txns}");
        }
    }
}
