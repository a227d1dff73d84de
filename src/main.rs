use log::{debug, error};
use std::fs::File;
use std::io::{self, Read};
use std::process::ExitCode;

use wavesh::shell::source::ReadSource;
use wavesh::shell::{Mode, Shell};
use wavesh::utils::config::Config;
use wavesh::utils::log::init_logger;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed command-line arguments
#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    print: bool,
    parallel: bool,
    graph: bool,
    help: bool,
    version: bool,
    script: Option<String>,
}

/// Parse command-line arguments
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-p" | "--print" => cli.print = true,
            "-t" | "--parallel" => cli.parallel = true,
            "-g" | "--graph" => cli.graph = true,
            "-h" | "--help" => cli.help = true,
            "-V" | "--version" => cli.version = true,
            "-" => cli.script = None,
            flag if flag.starts_with('-') => return Err(format!("unknown option '{}'", flag)),
            path => {
                if cli.script.is_some() {
                    return Err(format!("unexpected argument '{}'", path));
                }
                cli.script = Some(path.to_string());
            }
        }
    }

    Ok(cli)
}

fn print_help() {
    println!(
        r#"wavesh {}: run shell scripts, independent commands in parallel

USAGE:
    wavesh [OPTIONS] [SCRIPT]     Read SCRIPT, or stdin when absent or '-'

OPTIONS:
    -p, --print       Print the parsed command trees, run nothing
    -t, --parallel    Run trees concurrently, respecting file dependencies
    -g, --graph       Print the dependency graph, run nothing
    -h, --help        Show this help message
    -V, --version     Show version

ENVIRONMENT:
    WAVESH_LOG_LEVEL  error|warn|info|debug|trace (default warn)
    WAVESH_LOG_DIR    Also write logs to a dated file in this directory
    WAVESH_PARALLEL   1|true|yes makes --parallel the default"#,
        VERSION
    );
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("wavesh: {}", e);
            eprintln!("Try 'wavesh --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if cli.help {
        print_help();
        return ExitCode::SUCCESS;
    }
    if cli.version {
        println!("wavesh {}", VERSION);
        return ExitCode::SUCCESS;
    }

    let config = Config::new();
    if let Err(e) = init_logger(&config) {
        eprintln!("wavesh: failed to initialise logging: {}", e);
    }

    let reader: Box<dyn Read> = match &cli.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                eprintln!("wavesh: {}: {}", path, e);
                return ExitCode::from(1);
            }
        },
        None => Box::new(io::stdin()),
    };

    let shell = Shell::new(&config);
    let mode = if cli.print {
        Mode::Print
    } else if cli.graph {
        Mode::Graph
    } else if cli.parallel {
        Mode::Parallel
    } else {
        shell.default_mode()
    };
    debug!("脚本: {:?}, 模式: {:?}", cli.script, mode);

    let mut stdout = io::stdout();
    match shell.run(ReadSource::new(reader), mode, &mut stdout) {
        Ok(statuses) => {
            let last = statuses.last().copied().unwrap_or(0);
            ExitCode::from((last & 0xff) as u8)
        }
        Err(e) => {
            if !e.is_parse_error() {
                error!("执行失败: {}", e);
            }
            eprintln!("wavesh: {}", e);
            ExitCode::from(1)
        }
    }
}
