mod convert;
mod east;
mod errors;
mod expr;
mod human;
mod lexer;
mod lines;
mod stmt;
mod token;
mod types;
mod usage;

use errors::BuildError;
use serde_json::json;
use std::env;
use std::fs;
use std::process;

struct Options {
    input: String,
    output: Option<String>,
    pretty: bool,
    human_output: Option<String>,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = match parse_args(&args) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!(
                "usage: {} <input.py> [-o OUTPUT] [--pretty] [--human-output PATH]",
                args[0]
            );
            process::exit(1);
        }
    };

    let source = match fs::read_to_string(&opts.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", opts.input, e);
            process::exit(1);
        }
    };

    match convert::convert_source(&source, &opts.input) {
        Ok(module) => {
            let payload = json!({ "ok": true, "east": module });
            write_payload(&opts, &payload);
            if let Some(path) = &opts.human_output {
                if let Err(e) = fs::write(path, human::render(&module)) {
                    eprintln!("{}: {}", path, e);
                    process::exit(1);
                }
            }
        }
        Err(err) => {
            let payload = error_payload(&err);
            write_payload(&opts, &payload);
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut input = None;
    let mut output = None;
    let mut pretty = false;
    let mut human_output = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                output = Some(
                    args.get(i + 1)
                        .ok_or("-o requires an output path")?
                        .clone(),
                );
                i += 2;
            }
            "--pretty" => {
                pretty = true;
                i += 1;
            }
            "--human-output" => {
                human_output = Some(
                    args.get(i + 1)
                        .ok_or("--human-output requires a path")?
                        .clone(),
                );
                i += 2;
            }
            flag if flag.starts_with('-') => {
                return Err(format!("unknown flag '{}'", flag));
            }
            path => {
                if input.is_some() {
                    return Err("more than one input file given".to_string());
                }
                input = Some(path.to_string());
                i += 1;
            }
        }
    }

    Ok(Options {
        input: input.ok_or("missing input file")?,
        output,
        pretty,
        human_output,
    })
}

fn error_payload(err: &BuildError) -> serde_json::Value {
    json!({ "ok": false, "error": err })
}

fn write_payload(opts: &Options, payload: &serde_json::Value) {
    let text = if opts.pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    };
    let text = match text {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to serialize output: {}", e);
            process::exit(1);
        }
    };
    match &opts.output {
        Some(path) => {
            if let Err(e) = fs::write(path, text + "\n") {
                eprintln!("{}: {}", path, e);
                process::exit(1);
            }
        }
        None => println!("{}", text),
    }
}
