use remoteio_frame::{Op, ALL_OPS};
use serde::Serialize;

use crate::cmd::OpsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct OpEntry {
    name: &'static str,
    code: String,
    handles: usize,
}

#[derive(Serialize)]
struct OpsOutput {
    ops: Vec<OpEntry>,
}

fn entry(op: Op) -> OpEntry {
    OpEntry {
        name: op.name(),
        code: format!("{:#x}", op.raw()),
        handles: op.handle_count(),
    }
}

pub fn run(_args: OpsArgs, format: OutputFormat) -> CliResult<i32> {
    let out = OpsOutput {
        ops: ALL_OPS.iter().copied().map(entry).collect(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut t = table(vec!["OP", "CODE", "HANDLES"]);
            for op in &out.ops {
                t.add_row(vec![op.name.to_string(), op.code.clone(), op.handles.to_string()]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for op in &out.ops {
                println!("{:<10} {:>12}  handles={}", op.name, op.code, op.handles);
            }
        }
    }
    Ok(SUCCESS)
}
