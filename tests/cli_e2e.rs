use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn xser_bin() -> &'static str {
    env!("CARGO_BIN_EXE_xser")
}

fn test_temp_dir(tag: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("xser-cli-e2e-{tag}-{}-{ts}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn run_xser(args: &[&str]) -> Output {
    Command::new(xser_bin())
        .args(args)
        .output()
        .expect("run xser")
}

fn run_xser_stdin(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(xser_bin())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn xser");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait xser")
}

#[test]
fn cli_datei_zu_datei() {
    let dir = test_temp_dir("file");
    let input = dir.join("in.xml");
    let output = dir.join("out.xml");
    fs::write(&input, "<root><a>1</a></root>").expect("write xml");

    let out = run_xser(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--indent",
        "-p",
        "omit-xml-declaration=yes",
    ]);
    assert!(out.status.success(), "xser failed: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read_to_string(&output).unwrap(), "<root>\n  <a>1</a>\n</root>");
    assert!(!dir.join("out.xml.tmp").exists(), "tmp file left behind");
}

#[test]
fn cli_stdin_zu_stdout_html() {
    let out = run_xser_stdin(&["-m", "html", "-p", "indent=no"], "<html><body><br/></body></html>");
    assert!(out.status.success(), "xser failed: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        String::from_utf8(out.stdout).unwrap(),
        "<!DOCTYPE html>\n<html><body><br></body></html>"
    );
}

#[test]
fn cli_meldet_encoding_fallback() {
    let out = run_xser_stdin(&["-e", "x-unknown"], "<a/>");
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("SESU0007"), "{stderr}");
    assert_eq!(
        String::from_utf8(out.stdout).unwrap(),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"
    );
}

#[test]
fn cli_ungueltiger_parameter() {
    let out = run_xser_stdin(&["-p", "indent=vielleicht"], "<a/>");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("Fehler:"));
}

#[test]
fn cli_fehler_loescht_tmp_datei() {
    let dir = test_temp_dir("err");
    let input = dir.join("in.xml");
    let output = dir.join("out.xml");
    fs::write(&input, "<a><!--x--y--></a>").expect("write xml");

    let out = run_xser(&["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(!output.exists());
    assert!(!dir.join("out.xml.tmp").exists());
}

#[test]
fn cli_strip_space() {
    let out = run_xser_stdin(
        &["--strip-all", "-p", "omit-xml-declaration=yes"],
        "<r>\n  <a/>\n</r>",
    );
    assert!(out.status.success(), "xser failed: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8(out.stdout).unwrap(), "<r><a/></r>");
}
