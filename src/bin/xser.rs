//! xser CLI: serialize XML through the pipeline.

use clap::Parser;
use std::io::{IsTerminal, Read};
use std::process;
use std::rc::Rc;
use xser::diagnostics::{Diagnostic, DiagnosticsSink, Severity};
use xser::location::LocationProvider;
use xser::whitespace::NameTestRules;
use xser::{Destination, HostLanguage, OutputProperties, Serializer, StripSpace};

#[derive(Parser)]
#[command(name = "xser", about = "Serialize XML as xml, html, xhtml or text")]
struct Cli {
    /// Input file (- for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Output file (- or omitted = stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Output method (xml, html, xhtml, text); negotiated from the root element when omitted
    #[arg(short, long)]
    method: Option<String>,

    /// Output encoding
    #[arg(short, long)]
    encoding: Option<String>,

    /// Indent the result
    #[arg(long)]
    indent: bool,

    /// Further serialization parameters, e.g. -p omit-xml-declaration=yes
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Strip whitespace-only text in all elements
    #[arg(long, conflicts_with = "strip")]
    strip_all: bool,

    /// Strip whitespace-only text in elements matching these name tests (*, {uri}*, *:name, {uri}name, name)
    #[arg(long, value_name = "NAMETEST")]
    strip: Vec<String>,

    /// Keep whitespace-only text in elements matching these name tests
    #[arg(long, value_name = "NAMETEST", requires = "strip")]
    preserve: Vec<String>,

    /// Use XQuery error codes instead of XSLT ones
    #[arg(long)]
    xquery: bool,
}

/// Gibt Diagnosen auf stderr aus.
struct StderrDiagnostics;

impl DiagnosticsSink for StderrDiagnostics {
    fn report(&self, d: Diagnostic, locations: &dyn LocationProvider) {
        let label = if d.severity == Severity::Warning { "Hinweis" } else { "Fehler" };
        match locations.location(d.location) {
            Some(at) => eprintln!("{label}: {d} ({at})"),
            None => eprintln!("{label}: {d}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let props = output_properties(&cli)?;
    let input = read_input(&cli.input)?;

    let mut serializer = Serializer::new(props)
        .with_strip_space(strip_space(&cli))
        .with_diagnostics(Rc::new(StderrDiagnostics));
    if cli.xquery {
        serializer = serializer.with_host_language(HostLanguage::XQuery);
    }
    if cli.input != "-" {
        serializer = serializer.with_system_id(&cli.input);
    }

    match cli.output.as_deref() {
        None | Some("-") => {
            let stdout = Destination::Bytes(Box::new(std::io::stdout()));
            serializer.serialize_xml(input.as_slice(), stdout).map_err(|e| e.to_string())?;
            Ok(())
        }
        Some(path) => {
            // Erst in eine .tmp-Datei schreiben, bei Erfolg umbenennen.
            let tmp_path = format!("{path}.tmp");
            let result = serializer
                .serialize_xml(input.as_slice(), Destination::uri(tmp_path.as_str()))
                .map(|_| ())
                .map_err(|e| e.to_string());
            finish_tmp_output(result, &tmp_path, path)
        }
    }
}

fn output_properties(cli: &Cli) -> Result<OutputProperties, String> {
    let mut props = OutputProperties::default();
    let mut set = |name: &str, value: &str| {
        props.set(name, value).map_err(|e| format!("Ungueltiger Parameter: {e}"))
    };
    if let Some(method) = &cli.method {
        set("method", method)?;
    }
    if let Some(encoding) = &cli.encoding {
        set("encoding", encoding)?;
    }
    if cli.indent {
        set("indent", "yes")?;
    }
    for param in &cli.params {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| format!("Parameter ohne '=': {param}"))?;
        set(name.trim(), value)?;
    }
    Ok(props)
}

fn strip_space(cli: &Cli) -> StripSpace {
    if cli.strip_all {
        return StripSpace::All;
    }
    if cli.strip.is_empty() {
        return StripSpace::None;
    }
    let mut rules = NameTestRules::new();
    for test in &cli.strip {
        rules = rules.strip(test);
    }
    for test in &cli.preserve {
        rules = rules.preserve(test);
    }
    StripSpace::Rules(Rc::new(rules))
}

fn read_input(path: &str) -> Result<Vec<u8>, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| format!("Lesefehler (stdin): {e}"))?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|e| format!("Lesefehler '{}': {e}", path))
    }
}

/// Bei Erfolg: tmp-Datei auf Ziel umbenennen. Bei Fehler: tmp-Datei loeschen.
fn finish_tmp_output(result: Result<(), String>, tmp_path: &str, output_path: &str) -> Result<(), String> {
    match result {
        Ok(()) => std::fs::rename(tmp_path, output_path).map_err(|e| format!("Rename-Fehler: {e}")),
        Err(e) => {
            let _ = std::fs::remove_file(tmp_path);
            Err(e)
        }
    }
}
