use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("bundlewire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: bundlewire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("BUNDLEWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("protocol: {}", bundlewire_command::PROTOCOL_VERSION);
    println!("prefix: 4-byte big-endian");
    println!(
        "max_message_size: {}",
        bundlewire_frame::DEFAULT_MAX_MESSAGE_SIZE
    );
    println!("features: command={}, cli=true", cfg!(feature = "command"));

    Ok(SUCCESS)
}
