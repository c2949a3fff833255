use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ipcpipe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ipcpipe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("IPCPIPE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_backend: {}", default_backend());
    println!(
        "default_capacity: {}",
        ipcpipe_transport::DEFAULT_CAPACITY
    );
    println!("wire_format: utf-16le json envelope");

    Ok(SUCCESS)
}

fn default_backend() -> &'static str {
    if cfg!(unix) {
        "shm"
    } else {
        "memory"
    }
}
