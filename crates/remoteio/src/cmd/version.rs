use remoteio_frame::{HEADER_SIZE, MAX_CHUNK, MAX_HANDLES};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("remoteio {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: remoteio");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("REMOTEIO_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));
    println!("wire: header={HEADER_SIZE} max_chunk={MAX_CHUNK} max_handles={MAX_HANDLES}");

    Ok(SUCCESS)
}
