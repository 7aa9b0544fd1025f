use assert_cmd::Command;
use std::io::Write;
use std::path::PathBuf;
use std::str;

fn fixture_dir(name: &str) -> PathBuf {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.push("tests");
    dir.push(name);
    dir
}

/// Generic execution function that invokes geoipenrich with the given
/// database directory
fn run_with_dir(dir: PathBuf, input: &str, args: &[&str]) -> (bool, String, String) {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("geoipenrich").unwrap();
    let output = cmd
        .env("GEOIP_MMDB_DIR", dir.as_os_str())
        .env_remove("RUST_LOG")
        .args(args)
        .write_stdin(input)
        .output()
        .expect("failed to execute");

    let stdout = str::from_utf8(&output.stdout)
        .expect("Failed to read stdout as UTF-8")
        .to_string();
    let stderr = str::from_utf8(&output.stderr)
        .expect("Failed to read stderr as UTF-8")
        .to_string();

    (output.status.success(), stdout, stderr)
}

/// Runs with a database directory that does not exist, so every resolver
/// comes up disabled
fn run_geoipenrich(input: &str, args: &[&str]) -> (bool, String, String) {
    run_with_dir(PathBuf::from("/nonexistent/geoip"), input, args)
}

/// Runs against the MaxMind test databases
fn run_with_maxmind(input: &str, args: &[&str]) -> (bool, String, String) {
    run_with_dir(fixture_dir("maxmind"), input, args)
}

/// Records pass through untouched when no databases are available
#[test]
fn passthrough_without_databases() {
    let input = "{\"source_ip\":\"81.2.69.142\",\"bytes\":1024}\n{\"host_ip\":\"  240b::beef:0:24 \"}\n";
    let (ok, stdout, _) = run_geoipenrich(input, &[]);
    assert!(ok);
    assert_eq!(stdout, input);
}

/// Non-JSON lines and blank lines survive unchanged when disabled
#[test]
fn passthrough_of_non_json_lines() {
    let input = "plain text 81.2.69.142\n\n[1,2,3]\n{\"source_ip\":\"x\"}";
    let (ok, stdout, _) = run_geoipenrich(input, &[]);
    assert!(ok);
    assert_eq!(stdout, input);
}

/// The --disable switch short-circuits even when paths are given
#[test]
fn disable_switch() {
    let input = "{\"destination_ip\":\"175.16.199.37\"}\n";
    let (ok, stdout, _) = run_geoipenrich(
        input,
        &["--disable", "--city-db", "/nonexistent/city.mmdb"],
    );
    assert!(ok);
    assert_eq!(stdout, input);
}

/// Missing database files are reported as warnings, not failures
#[test]
fn missing_database_is_a_warning() {
    let input = "{\"source_ip\":\"81.2.69.142\"}\n";
    let (ok, stdout, stderr) = run_geoipenrich(input, &["--vendor", "ipinfo"]);
    assert!(ok);
    assert_eq!(stdout, input);
    assert!(
        stderr.contains("database not found"),
        "expected a warning about the missing database, got: {}",
        stderr
    );
}

/// Reading from a file argument and from "-" gives the same output
#[test]
fn file_input() {
    let input = "{\"source_ip\":\"81.2.69.142\"}\n";
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(input.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let (ok, stdout, _) = run_geoipenrich("", &[&path]);
    assert!(ok);
    assert_eq!(stdout, input);

    let (ok, stdout, _) = run_geoipenrich(input, &["-"]);
    assert!(ok);
    assert_eq!(stdout, input);
}

/// A configuration file is honored and validated
#[test]
fn config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"enabled": false, "vendor": "maxmind"}"#)
        .unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let input = "{\"host_ip\":\"81.2.69.142\"}\n";
    let (ok, stdout, _) = run_geoipenrich(input, &["--config", &path]);
    assert!(ok);
    assert_eq!(stdout, input);

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    bad.write_all(br#"{"vendor": "geolite"}"#).unwrap();
    let bad_path = bad.path().to_str().unwrap().to_string();

    let (ok, _, stderr) = run_geoipenrich(input, &["--config", &bad_path]);
    assert!(!ok);
    assert!(stderr.contains("invalid configuration"), "got: {}", stderr);
}

/// Unknown vendors are rejected by the argument parser
#[test]
fn unknown_vendor() {
    let (ok, _, stderr) = run_geoipenrich("", &["--vendor", "geolite"]);
    assert!(!ok);
    assert!(stderr.contains("geolite"));
}

/// A missing input file is an error naming the file
#[test]
fn missing_input_file() {
    let (ok, _, stderr) = run_geoipenrich("", &["/nonexistent/input.jsonl"]);
    assert!(!ok);
    assert!(stderr.contains("/nonexistent/input.jsonl"));
}

/// The resolve timer is exported in Prometheus text format
#[test]
fn metrics_output() {
    let (ok, _, stderr) = run_geoipenrich("{}\n", &["--metrics"]);
    assert!(ok);
    assert!(
        stderr.contains("geoip_resolver_engine_resolve_time_seconds_count 0"),
        "got: {}",
        stderr
    );
}

/// Records are enriched from the MaxMind databases; every other byte of the
/// line is kept
#[test]
fn maxmind_enrichment() {
    let input = concat!(
        r#"{"message":"accepted","source_ip":"81.2.69.142","host_ip":"240b::beef:0:24"}"#,
        "\n",
        r#"{"destination_ip":" 175.16.199.37 ","gl2_source_ip":"81.2.69.142"}"#,
        "\n",
    );
    let expected = concat!(
        r#"{"message":"accepted","source_ip":"81.2.69.142","host_ip":"240b::beef:0:24","#,
        r#""source_geo_coordinates":"51.5142,-0.0931","source_geo_country":"GB","#,
        r#""source_geo_city":"London","source_geo_region":"England","#,
        r#""source_geo_timeZone":"Europe/London","source_geo_name":"London, GB","#,
        r#""host_as_organization":"KDDI KDDI CORPORATION","host_as_number":2516}"#,
        "\n",
        r#"{"destination_ip":" 175.16.199.37 ","gl2_source_ip":"81.2.69.142","#,
        r#""destination_geo_coordinates":"43.88,125.3228","destination_geo_country":"CN","#,
        r#""destination_geo_city":"Changchun","destination_geo_region":"Jilin Sheng","#,
        r#""destination_geo_timeZone":"Asia/Harbin","destination_geo_name":"Changchun, CN","#,
        r#""destination_as_organization":null,"destination_as_number":4837}"#,
        "\n",
    );
    let (ok, stdout, stderr) = run_with_maxmind(input, &[]);
    assert!(ok, "stderr: {}", stderr);
    assert_eq!(stdout, expected);
}

/// Explicit database paths work without a database directory
#[test]
fn explicit_database_paths() {
    let city = fixture_dir("maxmind").join("GeoLite2-City.mmdb");
    let input = "{\"host_ip\":\"2001:218::1\"}";
    let (ok, stdout, _) = run_geoipenrich(input, &["--city-db", city.to_str().unwrap()]);
    assert!(ok);
    assert_eq!(
        stdout,
        concat!(
            r#"{"host_ip":"2001:218::1","host_geo_coordinates":"35.68536,139.75309","#,
            r#""host_geo_country":"JP","host_geo_city":null,"host_geo_region":null,"#,
            r#""host_geo_timeZone":"Asia/Tokyo"}"#
        )
    );
}

/// Lines the engine cannot read are passed through with a warning
#[test]
fn enabled_passthrough_of_non_json_lines() {
    let input = "plain text 81.2.69.142\n\n[1,2]\r\n{\"source_ip\":\"192.0.2.1\",\"n\":1.10}\n";
    let (ok, stdout, stderr) = run_with_maxmind(input, &[]);
    assert!(ok);
    assert_eq!(stdout, input);
    assert!(stderr.contains("not a JSON object"), "got: {}", stderr);
}

/// IPinfo databases are read with --vendor ipinfo
#[test]
fn ipinfo_enrichment() {
    let input = "{\"source_ip\":\"1.128.0.1\"}\n";
    let (ok, stdout, stderr) =
        run_with_dir(fixture_dir("ipinfo"), input, &["--vendor", "ipinfo"]);
    assert!(ok, "stderr: {}", stderr);
    assert_eq!(
        stdout,
        concat!(
            r#"{"source_ip":"1.128.0.1","source_as_organization":"Telstra Pty Ltd","#,
            r#""source_as_number":1221}"#,
            "\n"
        )
    );
}

/// Every lookup is timed
#[test]
fn metrics_count_lookups() {
    let input = "{\"source_ip\":\"81.2.69.142\",\"host_ip\":\"nope\"}\n";
    let (ok, _, stderr) = run_with_maxmind(input, &["--metrics"]);
    assert!(ok);
    assert!(
        stderr.contains("geoip_resolver_engine_resolve_time_seconds_count 2"),
        "got: {}",
        stderr
    );
}
