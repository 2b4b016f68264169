use bundlewire_channel::{FifoPair, FifoPaths};

use crate::cmd::MkfifoArgs;
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_fifo_paths, OutputFormat};

pub fn run(args: MkfifoArgs, format: OutputFormat) -> CliResult<i32> {
    let mode = parse_mode(&args.mode)?;
    let pair = FifoPair::create_with_mode(FifoPaths::in_dir(&args.dir), mode)
        .map_err(|err| channel_error("mkfifo failed", err))?;
    let paths = pair.persist();
    tracing::info!(inbound = ?paths.inbound, outbound = ?paths.outbound, "named pipes ready");
    print_fifo_paths(&paths.inbound, &paths.outbound, mode, format);
    Ok(SUCCESS)
}

fn parse_mode(input: &str) -> CliResult<u32> {
    let digits = input.trim().trim_start_matches("0o");
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| CliError::new(USAGE, format!("invalid octal mode: {input}")))?;
    if mode > 0o777 {
        return Err(CliError::new(USAGE, format!("mode out of range: {input}")));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_octal_modes() {
        assert_eq!(parse_mode("600").unwrap(), 0o600);
        assert_eq!(parse_mode("0o644").unwrap(), 0o644);
        assert_eq!(parse_mode("0660").unwrap(), 0o660);
    }

    #[test]
    fn rejects_bad_modes() {
        assert_eq!(parse_mode("rw").unwrap_err().code, USAGE);
        assert_eq!(parse_mode("800").unwrap_err().code, USAGE);
        assert_eq!(parse_mode("7777").unwrap_err().code, USAGE);
    }
}
