use std::{fs, io};

use anyhow::{anyhow, Context};
use clap::{crate_version, App, Arg, ArgMatches};

use kiln::backend::Backend;
use kiln::ir::{exec::Executor, Module};
use kiln::parser::{NumericLiterals, Parser};
use kiln::pipeline::{Kind, Pipeline};
use kiln::source::{CharSource, ReadSource, StrSource};

/// What the driver needs from a backend beyond building IR.
trait Target: Backend {
    fn render_function(&self, function: Self::Function) -> String;
    fn render_module(&self) -> String;
    fn evaluate(&self, function: Self::Function) -> kiln::Result<f64>;
}

impl Target for Module {
    fn render_function(&self, function: Self::Function) -> String {
        self.print_function(function)
    }

    fn render_module(&self) -> String {
        self.to_string()
    }

    fn evaluate(&self, function: Self::Function) -> kiln::Result<f64> {
        Ok(Executor::new(self).call(function, &[])?)
    }
}

#[cfg(feature = "llvm")]
impl<'a> Target for kiln::llvm::LlvmBackend<'a> {
    fn render_function(&self, function: Self::Function) -> String {
        self.print_function(function)
    }

    fn render_module(&self) -> String {
        self.print_to_string()
    }

    fn evaluate(&self, function: Self::Function) -> kiln::Result<f64> {
        Ok(self.run(function)?)
    }
}

fn app() -> App<'static, 'static> {
    App::new("kiln")
        .version(crate_version!())
        .about("compiles and runs kiln programs")
        .arg(
            Arg::with_name("file")
                .help("source file to compile, - for stdin")
                .index(1)
                .required_unless("expr"),
        )
        .arg(
            Arg::with_name("expr")
                .short("e")
                .long("expr")
                .takes_value(true)
                .conflicts_with("file")
                .help("source text to compile"),
        )
        .arg(
            Arg::with_name("emit-ir")
                .long("emit-ir")
                .help("print the IR of every lowered construct"),
        )
        .arg(
            Arg::with_name("strict-numbers")
                .long("strict-numbers")
                .help("reject malformed numeric literals instead of truncating them"),
        )
        .arg(
            Arg::with_name("backend")
                .long("backend")
                .takes_value(true)
                .possible_values(&["ir", "llvm"])
                .default_value("ir"),
        )
}

fn run<T: Target, S: CharSource>(
    target: T,
    parser: Parser,
    source: S,
    emit_ir: bool,
) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::new(parser, target);
    let unit = pipeline.compile(source);
    let target = pipeline.backend();

    let mut failures = 0;
    for outcome in &unit.outcomes {
        let function = match &outcome.result {
            Ok(function) => *function,
            Err(e) => {
                failures += 1;
                eprintln!("error: {} in `{}`", e, outcome.source);
                continue;
            }
        };
        println!("parsed a {}", outcome.kind);
        if emit_ir {
            eprint!("{}", target.render_function(function));
        }
        if outcome.kind == Kind::TopLevel {
            match target.evaluate(function) {
                Ok(value) => println!("Result: {}", value),
                Err(e) => {
                    failures += 1;
                    eprintln!("error: {} in `{}`", e, outcome.source);
                }
            }
        }
    }

    if emit_ir {
        println!("IR:");
        println!("{}", target.render_module());
    }

    if let Some(e) = unit.parse_error {
        return Err(anyhow!(e).context("parsing stopped"));
    }
    if failures > 0 {
        return Err(anyhow!("{} construct(s) failed", failures));
    }
    Ok(())
}

fn dispatch<S: CharSource>(matches: &ArgMatches, parser: Parser, source: S) -> anyhow::Result<()> {
    let emit_ir = matches.is_present("emit-ir");
    match matches.value_of("backend") {
        #[cfg(feature = "llvm")]
        Some("llvm") => {
            let context = inkwell::context::Context::create();
            run(kiln::llvm::LlvmBackend::new(&context, "kiln"), parser, source, emit_ir)
        }
        #[cfg(not(feature = "llvm"))]
        Some("llvm") => Err(anyhow!("kiln was built without the llvm feature")),
        _ => run(Module::new("kiln"), parser, source, emit_ir),
    }
}

fn main() -> anyhow::Result<()> {
    let matches = app().get_matches();

    let numeric_literals = if matches.is_present("strict-numbers") {
        NumericLiterals::Strict
    } else {
        NumericLiterals::Lenient
    };
    let parser = Parser::default().with_numeric_literals(numeric_literals);

    match (matches.value_of("expr"), matches.value_of("file")) {
        (Some(expr), _) => {
            println!("Source:");
            println!("{}\n", expr);
            dispatch(&matches, parser, StrSource::new(expr))
        }
        (None, Some("-")) => {
            let stdin = io::stdin();
            let mut source = ReadSource::new(stdin.lock());
            let res = dispatch(&matches, parser, &mut source);
            if let Some(e) = source.take_error() {
                return Err(e).context("failed to read stdin");
            }
            res
        }
        (None, Some(path)) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            dispatch(&matches, parser, StrSource::new(&text))
        }
        (None, None) => Err(anyhow!("no input given")),
    }
}
