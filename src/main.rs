use std::{env, fs, rc::Rc};

use plflux::{
    Config, Engine,
    bytecode::{compiler::compile_source, op_code::disassemble},
    handler::{CallSite, FunctionCall, ResultSet, SetStatus, call_handler, inline_handler},
    host::{Datum, Host, MemoryCatalog, Notice, ProcDefinition},
    runtime::leak_detector,
    syntax::lexer::Lexer,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let mut args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|arg| arg == "--verbose");
    let leak_detector = args.iter().any(|arg| arg == "--leak-detector");
    let untrusted = args.iter().any(|arg| arg == "--untrusted");
    let returns_set = args.iter().any(|arg| arg == "--set");
    args.retain(|arg| {
        !matches!(
            arg.as_str(),
            "--verbose" | "--leak-detector" | "--untrusted" | "--set"
        )
    });
    let config_path = extract_flag_value(&mut args, "--config");

    let filter = if verbose { "plflux=debug" } else { "plflux=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    if args.len() < 2 {
        print_help();
        return;
    }

    let config = match config_path {
        Some(path) => match read(&path).and_then(|text| Config::from_json(&text).map_err(|e| e.to_string())) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {}", err);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let code = match args[1].as_str() {
        "-h" | "--help" | "help" => {
            print_help();
            0
        }
        "do" => {
            if args.len() < 3 {
                eprintln!("Usage: plflux do <file>");
                return;
            }
            run_inline(&args[2], config, !untrusted)
        }
        "call" => {
            if args.len() < 3 {
                eprintln!("Usage: plflux call <file> [args...]");
                return;
            }
            run_call(&args[2], &args[3..], config, !untrusted, returns_set)
        }
        "bytecode" => {
            if args.len() < 3 {
                eprintln!("Usage: plflux bytecode <file>");
                return;
            }
            show_bytecode(&args[2])
        }
        "tokens" => {
            if args.len() < 3 {
                eprintln!("Usage: plflux tokens <file>");
                return;
            }
            show_tokens(&args[2])
        }
        other => {
            eprintln!("Error: unknown command '{}'", other);
            print_help();
            2
        }
    };

    if leak_detector {
        let stats = leak_detector::snapshot();
        eprintln!(
            "leak-detector: compiled_functions={} closures={} function_objects={} (live {}, leaked {}) activations={} (live {})",
            stats.compiled_functions,
            stats.closures,
            stats.function_objects_created,
            stats.live_function_objects(),
            stats.function_objects_leaked,
            stats.activations_created,
            stats.live_activations(),
        );
    }
    if code != 0 {
        std::process::exit(code);
    }
}

fn print_help() {
    println!(
        "\
plflux

Usage:
  plflux do <file>                 Run a file as an anonymous code block
  plflux call <file> [args...]     Store a file as a procedure and call it
  plflux bytecode <file>           Show compiled bytecode
  plflux tokens <file>             Show lexer tokens

Flags:
  --config <file.json>   Handler configuration
  --untrusted            Run under the untrusted principal
  --set                  Treat the procedure as set-returning (call)
  --verbose              Log cache and compile activity
  --leak-detector        Print object lifetime counters after the run"
    );
}

fn extract_flag_value(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let index = args.iter().position(|arg| arg == flag)?;
    if index + 1 >= args.len() {
        args.remove(index);
        return None;
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Some(value)
}

fn read(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("could not read {}: {}", path, err))
}

fn print_notices(notices: Vec<Notice>) {
    for notice in notices {
        println!("{}", notice);
    }
}

fn new_engine(catalog: Rc<MemoryCatalog>, config: Config) -> Engine {
    Engine::new(Host::new(catalog), config)
}

fn run_inline(path: &str, config: Config, trusted: bool) -> i32 {
    let source = match read(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    let engine = new_engine(Rc::new(MemoryCatalog::new()), config);
    let result = inline_handler(&engine, &source, trusted);
    print_notices(engine.host().take_notices());
    engine.proc_exit(0);
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("ERROR:  {}", err);
            1
        }
    }
}

fn parse_datum(text: &str) -> Datum {
    if text == "null" {
        Datum::Null
    } else if let Ok(value) = text.parse::<i64>() {
        Datum::Int(value)
    } else if let Ok(value) = text.parse::<f64>() {
        Datum::Float(value)
    } else if let Ok(value) = text.parse::<bool>() {
        Datum::Bool(value)
    } else {
        Datum::Text(text.to_string())
    }
}

fn run_call(path: &str, call_args: &[String], config: Config, trusted: bool, returns_set: bool) -> i32 {
    let source = match read(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    let catalog = Rc::new(MemoryCatalog::new());
    let name = std::path::Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("main")
        .to_string();
    let mut def = ProcDefinition::new(name, source)
        .with_args((1..=call_args.len()).map(|i| format!("arg{}", i)));
    if returns_set {
        def = def.returns_set();
    }
    if !trusted {
        def = def.untrusted();
    }
    let id = catalog.define(def);
    let engine = new_engine(catalog, config);

    let result = run_site(&engine, id, call_args, trusted, returns_set);
    print_notices(engine.host().take_notices());
    engine.proc_exit(0);
    match result {
        Ok(rows) => {
            for row in rows {
                println!("{}", row);
            }
            0
        }
        Err(err) => {
            eprintln!("ERROR:  {}", err);
            1
        }
    }
}

fn run_site(
    engine: &Engine,
    id: plflux::host::ProcId,
    call_args: &[String],
    trusted: bool,
    returns_set: bool,
) -> Result<Vec<Datum>, plflux::bridge::BridgeError> {
    let site = CallSite::new(engine, id)?;
    let args: Vec<Datum> = call_args.iter().map(|arg| parse_datum(arg)).collect();
    let mut rows = Vec::new();

    if returns_set {
        let result_set = ResultSet::new(engine)?;
        loop {
            let mut call = FunctionCall::new(&site, args.clone()).with_result_set(&result_set);
            call.trusted = trusted;
            let row = call_handler(engine, &call)?;
            if result_set.status() == SetStatus::End {
                break;
            }
            rows.push(row);
        }
        engine.release_region(result_set.scope)?;
    } else {
        let mut call = FunctionCall::new(&site, args);
        call.trusted = trusted;
        rows.push(call_handler(engine, &call)?);
    }
    engine.release_region(site.region)?;
    Ok(rows)
}

fn show_bytecode(path: &str) -> i32 {
    let source = match read(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    match compile_source("main", &source) {
        Ok(function) => {
            print!("{}", disassemble(&function.instructions));
            for (i, proto) in function.protos.iter().enumerate() {
                println!("\nfunction #{} {}:", i, proto.name);
                print!("{}", disassemble(&proto.instructions));
            }
            0
        }
        Err(err) => {
            eprintln!("{}: {}", path, err);
            1
        }
    }
}

fn show_tokens(path: &str) -> i32 {
    let source = match read(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            return 1;
        }
    };
    for token in Lexer::new(source).tokenize() {
        println!("{:>4}:{:<3} {:?} {}", token.position.line, token.position.column, token.token_type, token);
    }
    0
}
