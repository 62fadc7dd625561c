//! Transcript grading: locate the marker-delimited test-output region and
//! classify result lines into per-test verdicts.
//!
//! Everything the executor reports after running untrusted code is data, not
//! an error: a transcript missing its markers grades as [`TranscriptCoverage::Incomplete`]
//! with an empty verdict map, a rejected test patch sets a flag on the report,
//! and an unknown framework degrades to keyword matching with
//! `low_confidence` set. [`parse_transcript`] never fails.
//!
//! # Invariants
//! - Marker lines are matched by substring containment, not whole-line
//!   equality. The evaluation stage runs under `bash -x`, so each marker
//!   reaches the transcript as a trace line such as
//!   `+ : '>>>>> Start Test Output'`.
//! - Result lines outside the delimited region are never graded.
//! - When the same test identifier produces several result lines, the last
//!   one wins.

use crate::script::{END_TEST_OUTPUT, START_TEST_OUTPUT};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Result-line matcher a registry entry selects for its transcripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogParserKind {
    /// Jest with the verbose reporter (`✓` / `✕` / `○` glyph lines).
    Jest,
    /// Mocha spec reporter (`✓ name`, numbered failures, `- name` pending).
    Mocha,
    /// Mocha (or cypress) `--reporter json`: one JSON document per run.
    MochaJson,
    /// Karma result lines suffixed `SUCCESS` / `FAILED` / `SKIPPED`.
    Karma,
    /// Test Anything Protocol (`ok N - name` / `not ok N - name`).
    Tap,
    /// `phpunit --testdox` glyph lines (`✔` / `✘` / `↩`).
    PhpunitTestdox,
    /// Keyword fallback for unregistered frameworks; flags the report
    /// `low_confidence`.
    #[default]
    Generic,
}

impl std::fmt::Display for LogParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Jest => "jest",
            Self::Mocha => "mocha",
            Self::MochaJson => "mocha-json",
            Self::Karma => "karma",
            Self::Tap => "tap",
            Self::PhpunitTestdox => "phpunit-testdox",
            Self::Generic => "generic",
        };
        f.write_str(tag)
    }
}

/// Four-way verdict for one test identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Skipped,
}

/// Whether both sentinel markers were present in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptCoverage {
    Complete,
    Incomplete,
}

/// Graded transcript: verdicts plus the anomaly flags the grading side
/// reports as data instead of raising.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub verdicts: BTreeMap<String, TestStatus>,
    pub coverage: TranscriptCoverage,
    pub low_confidence: bool,
    pub patch_rejected: bool,
    pub generated_at: DateTime<Utc>,
}

impl TestReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.coverage == TranscriptCoverage::Complete
    }
}

/// `git apply --verbose --reject` leaves these in the transcript when the
/// test patch does not land cleanly.
const PATCH_REJECT_SIGNATURES: [&str; 3] = [
    "Rejected hunk",
    "error: patch failed",
    "patch does not apply",
];

/// Grade a combined stdout/stderr transcript with the matcher for `kind`.
#[must_use]
pub fn parse_transcript(transcript: &str, kind: LogParserKind) -> TestReport {
    let start_at = transcript.find(START_TEST_OUTPUT);
    let preamble = start_at.map_or(transcript, |at| &transcript[..at]);
    let patch_rejected = PATCH_REJECT_SIGNATURES
        .iter()
        .any(|sig| preamble.contains(sig));

    let Some(region) = delimited_region(transcript) else {
        tracing::debug!(?kind, "transcript missing a sentinel marker");
        return TestReport {
            verdicts: BTreeMap::new(),
            coverage: TranscriptCoverage::Incomplete,
            low_confidence: false,
            patch_rejected,
            generated_at: Utc::now(),
        };
    };

    let verdicts = parse_region(region, kind);
    tracing::debug!(?kind, verdicts = verdicts.len(), "graded transcript region");
    TestReport {
        verdicts,
        coverage: TranscriptCoverage::Complete,
        low_confidence: kind == LogParserKind::Generic,
        patch_rejected,
        generated_at: Utc::now(),
    }
}

/// Complete lines strictly between the start-marker line and the next
/// end-marker line. `None` when either marker is absent.
fn delimited_region(transcript: &str) -> Option<&str> {
    let start_at = transcript.find(START_TEST_OUTPUT)?;
    let region_start = transcript[start_at..]
        .find('\n')
        .map(|nl| start_at + nl + 1)?;
    let end_at = region_start + transcript[region_start..].find(END_TEST_OUTPUT)?;
    let end_line_start = transcript[region_start..end_at]
        .rfind('\n')
        .map_or(region_start, |nl| region_start + nl + 1);
    Some(&transcript[region_start..end_line_start])
}

fn parse_region(region: &str, kind: LogParserKind) -> BTreeMap<String, TestStatus> {
    match kind {
        LogParserKind::Jest => parse_jest(region),
        LogParserKind::Mocha => parse_mocha(region),
        LogParserKind::MochaJson => parse_mocha_json(region),
        LogParserKind::Karma => parse_karma(region),
        LogParserKind::Tap => parse_tap(region),
        LogParserKind::PhpunitTestdox => parse_phpunit_testdox(region),
        LogParserKind::Generic => parse_generic(region),
    }
}

// MARK: jest

fn jest_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `✓ adds numbers (3 ms)`; the timing suffix is optional.
    RE.get_or_init(|| {
        Regex::new(r"^\s*(✓|✕|○|✎)\s+(.+?)(?:\s+\(\d+(?:\.\d+)?\s*m?s\))?\s*$")
            .expect("jest result regex")
    })
}

fn parse_jest(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        if let Some(caps) = jest_line().captures(line) {
            let status = match &caps[1] {
                "✓" => TestStatus::Passed,
                "✕" => TestStatus::Failed,
                _ => TestStatus::Skipped,
            };
            verdicts.insert(caps[2].to_string(), status);
        }
    }
    verdicts
}

// MARK: mocha (spec reporter)

fn mocha_pass_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*✓\s+(.+?)(?:\s+\(\d+(?:\.\d+)?\s*m?s\))?\s*$").expect("mocha pass regex")
    })
}

fn mocha_fail_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Failures are numbered both inline and in the summary; the summary form
    // carries a trailing colon.
    RE.get_or_init(|| Regex::new(r"^\s*\d+\)\s+(.+?):?\s*$").expect("mocha fail regex"))
}

fn mocha_pending_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s+(\S.*?)\s*$").expect("mocha pending regex"))
}

fn parse_mocha(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        if let Some(caps) = mocha_pass_line().captures(line) {
            verdicts.insert(caps[1].to_string(), TestStatus::Passed);
        } else if let Some(caps) = mocha_fail_line().captures(line) {
            verdicts.insert(caps[1].to_string(), TestStatus::Failed);
        } else if let Some(caps) = mocha_pending_line().captures(line) {
            verdicts.insert(caps[1].to_string(), TestStatus::Skipped);
        }
    }
    verdicts
}

// MARK: mocha --reporter json

#[derive(Debug, Deserialize)]
struct MochaJsonRun {
    #[serde(default)]
    passes: Vec<MochaJsonCase>,
    #[serde(default)]
    failures: Vec<MochaJsonCase>,
    #[serde(default)]
    pending: Vec<MochaJsonCase>,
}

#[derive(Debug, Deserialize)]
struct MochaJsonCase {
    #[serde(rename = "fullTitle")]
    full_title: String,
}

/// First balanced `{...}` object starting at the beginning of `text`,
/// respecting JSON string escapes. `None` when the object never closes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// One region can hold several reporter documents (one per cd/run/cd-back
/// group), surrounded by npm noise. Every blob that deserializes contributes
/// verdicts; anything else is skipped over.
fn parse_mocha_json(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    let mut cursor = 0;
    while let Some(open_rel) = region[cursor..].find('{') {
        let open = cursor + open_rel;
        let Some(blob) = balanced_object(&region[open..]) else {
            cursor = open + 1;
            continue;
        };
        if let Ok(run) = serde_json::from_str::<MochaJsonRun>(blob) {
            for case in run.passes {
                verdicts.insert(case.full_title, TestStatus::Passed);
            }
            for case in run.pending {
                verdicts.insert(case.full_title, TestStatus::Skipped);
            }
            for case in run.failures {
                verdicts.insert(case.full_title, TestStatus::Failed);
            }
            cursor = open + blob.len();
        } else {
            cursor = open + 1;
        }
    }
    verdicts
}

// MARK: karma

fn karma_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `Chrome Headless 94.0.4606.61 (Linux x86_64) suite spec FAILED`; the
    // browser prefix ends at its parenthesized platform.
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:.*?\)\s+)?(.+?)\s+(SUCCESS|FAILED|SKIPPED)\s*$")
            .expect("karma result regex")
    })
}

fn parse_karma(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        if let Some(caps) = karma_line().captures(line) {
            let name = caps[1].to_string();
            // `TOTAL: 12 SUCCESS` is the run summary, not a test.
            if name.starts_with("TOTAL:") || name.starts_with("Executed ") {
                continue;
            }
            let status = match &caps[2] {
                "SUCCESS" => TestStatus::Passed,
                "FAILED" => TestStatus::Failed,
                _ => TestStatus::Skipped,
            };
            verdicts.insert(name, status);
        }
    }
    verdicts
}

// MARK: tap

fn tap_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(not\s+)?ok\b\s*\d*\s*-?\s*(.+?)\s*$").expect("tap result regex")
    })
}

fn parse_tap(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        let Some(caps) = tap_line().captures(line) else {
            continue;
        };
        let failed = caps.get(1).is_some();
        let raw = &caps[2];
        let (name, directive) = match raw.split_once('#') {
            Some((name, directive)) => (name.trim(), Some(directive.trim())),
            None => (raw, None),
        };
        if name.is_empty() {
            continue;
        }
        let skipped = directive.is_some_and(|d| {
            let upper = d.to_ascii_uppercase();
            upper.starts_with("SKIP") || upper.starts_with("TODO")
        });
        let status = if skipped {
            TestStatus::Skipped
        } else if failed {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        verdicts.insert(name.to_string(), status);
    }
    verdicts
}

// MARK: phpunit --testdox

fn phpunit_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([✔✘↩∅⚠])\s+(.+?)\s*$").expect("testdox result regex"))
}

fn parse_phpunit_testdox(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        if let Some(caps) = phpunit_line().captures(line) {
            let status = match &caps[1] {
                "✔" => TestStatus::Passed,
                "✘" => TestStatus::Failed,
                _ => TestStatus::Skipped,
            };
            verdicts.insert(caps[2].to_string(), status);
        }
    }
    verdicts
}

// MARK: generic fallback

fn generic_prefix_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(pass(?:ed)?|fail(?:ed)?|error|skip(?:ped)?)\b[:\s]\s*(.+?)\s*$")
            .expect("generic prefix regex")
    })
}

fn generic_suffix_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `test parser::roundtrip ... ok` and similar dotted-result shapes.
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:test\s+)?(.+?)\s*\.\.\.\s*(ok|pass(?:ed)?|fail(?:ed)?|error|ignored|skip(?:ped)?)\s*$")
            .expect("generic suffix regex")
    })
}

fn status_for_token(token: &str) -> Option<TestStatus> {
    Some(match token.to_ascii_lowercase().as_str() {
        "pass" | "passed" | "ok" => TestStatus::Passed,
        "fail" | "failed" => TestStatus::Failed,
        "error" => TestStatus::Error,
        "skip" | "skipped" | "ignored" | "pending" => TestStatus::Skipped,
        _ => return None,
    })
}

fn parse_generic(region: &str) -> BTreeMap<String, TestStatus> {
    let mut verdicts = BTreeMap::new();
    for line in region.lines() {
        if let Some(caps) = generic_prefix_line().captures(line) {
            if let Some(status) = status_for_token(&caps[1]) {
                verdicts.insert(caps[2].to_string(), status);
            }
        } else if let Some(caps) = generic_suffix_line().captures(line) {
            if let Some(status) = status_for_token(&caps[2]) {
                verdicts.insert(caps[1].to_string(), status);
            }
        }
    }
    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrapped(body: &str) -> String {
        format!(
            "npm WARN something\n+ : '{START_TEST_OUTPUT}'\n{body}\n+ : '{END_TEST_OUTPUT}'\ntrailing noise\n"
        )
    }

    #[test]
    fn test_jest_glyph_lines_with_timing_suffix() {
        let transcript = wrapped(
            "  ✓ adds numbers (3 ms)\n  ✕ subtracts numbers\n  ○ legacy case\nPASS src/math.test.js",
        );
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert!(report.is_complete());
        assert!(!report.low_confidence);
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.verdicts["adds numbers"], TestStatus::Passed);
        assert_eq!(report.verdicts["subtracts numbers"], TestStatus::Failed);
        assert_eq!(report.verdicts["legacy case"], TestStatus::Skipped);
    }

    #[test]
    fn test_jest_last_result_line_wins() {
        let transcript = wrapped("  ✕ flaky case\n  ✓ flaky case (12 ms)");
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert_eq!(report.verdicts["flaky case"], TestStatus::Passed);
    }

    #[test]
    fn test_mocha_pass_fail_and_pending_lines() {
        let transcript = wrapped(
            "    ✓ parses greedy patterns (45ms)\n    1) rejects bad tokens\n    - not implemented yet",
        );
        let report = parse_transcript(&transcript, LogParserKind::Mocha);
        assert_eq!(report.verdicts["parses greedy patterns"], TestStatus::Passed);
        assert_eq!(report.verdicts["rejects bad tokens"], TestStatus::Failed);
        assert_eq!(report.verdicts["not implemented yet"], TestStatus::Skipped);
    }

    #[test]
    fn test_mocha_json_blob_amid_noise() {
        let body = r#"yarn run v1.22.19
{"stats":{"tests":3},"passes":[{"fullTitle":"suite works"}],"failures":[{"fullTitle":"suite breaks"}],"pending":[{"fullTitle":"suite waits"}]}
Done in 4.2s"#;
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::MochaJson);
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.verdicts["suite works"], TestStatus::Passed);
        assert_eq!(report.verdicts["suite breaks"], TestStatus::Failed);
        assert_eq!(report.verdicts["suite waits"], TestStatus::Skipped);
    }

    #[test]
    fn test_mocha_json_merges_multiple_runner_documents() {
        let body = concat!(
            r#"{"passes":[{"fullTitle":"driver clicks"}],"failures":[],"pending":[]}"#,
            "\ncd ../..\n",
            r#"{"passes":[],"failures":[{"fullTitle":"extension loads"}],"pending":[]}"#,
        );
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::MochaJson);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(report.verdicts["driver clicks"], TestStatus::Passed);
        assert_eq!(report.verdicts["extension loads"], TestStatus::Failed);
    }

    #[test]
    fn test_karma_strips_browser_prefix_and_summary_lines() {
        let body = "Chrome Headless 94.0.4606.61 (Linux x86_64) ol.source.Vector adds features FAILED\n\
                    Chrome Headless 94.0.4606.61 (Linux x86_64) ol.source.Vector clears features SUCCESS\n\
                    TOTAL: 2 SUCCESS";
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::Karma);
        assert_eq!(report.verdicts.len(), 2);
        assert_eq!(
            report.verdicts["ol.source.Vector adds features"],
            TestStatus::Failed
        );
        assert_eq!(
            report.verdicts["ol.source.Vector clears features"],
            TestStatus::Passed
        );
    }

    #[test]
    fn test_tap_lines_with_skip_directive() {
        let body = "TAP version 13\nok 1 - parses empty input\nnot ok 2 - rejects cycles\nok 3 - slow path # SKIP too slow\n1..3";
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::Tap);
        assert_eq!(report.verdicts["parses empty input"], TestStatus::Passed);
        assert_eq!(report.verdicts["rejects cycles"], TestStatus::Failed);
        assert_eq!(report.verdicts["slow path"], TestStatus::Skipped);
    }

    #[test]
    fn test_phpunit_testdox_glyphs() {
        let body = "Indent (PhpOffice\\PhpSpreadsheetTests\\Writer\\Ods\\Indent)\n ✔ Indent on cell with wrap text\n ✘ Indent with invalid unit\n ↩ Pending units";
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::PhpunitTestdox);
        assert_eq!(
            report.verdicts["Indent on cell with wrap text"],
            TestStatus::Passed
        );
        assert_eq!(report.verdicts["Indent with invalid unit"], TestStatus::Failed);
        assert_eq!(report.verdicts["Pending units"], TestStatus::Skipped);
    }

    #[test]
    fn test_generic_fallback_flags_low_confidence() {
        let body = "PASS src/app.test.js\nFAIL: integration suite\ntest codec::roundtrip ... ok";
        let transcript = wrapped(body);
        let report = parse_transcript(&transcript, LogParserKind::Generic);
        assert!(report.low_confidence);
        assert_eq!(report.verdicts["src/app.test.js"], TestStatus::Passed);
        assert_eq!(report.verdicts["integration suite"], TestStatus::Failed);
        assert_eq!(report.verdicts["codec::roundtrip"], TestStatus::Passed);
    }

    #[test]
    fn test_missing_end_marker_is_incomplete_with_empty_verdicts() {
        let transcript = format!("+ : '{START_TEST_OUTPUT}'\n  ✓ would have passed\n");
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert_eq!(report.coverage, TranscriptCoverage::Incomplete);
        assert!(report.verdicts.is_empty());
        assert!(!report.low_confidence);
    }

    #[test]
    fn test_missing_start_marker_is_incomplete() {
        let transcript = format!("  ✓ stray line\n+ : '{END_TEST_OUTPUT}'\n");
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert_eq!(report.coverage, TranscriptCoverage::Incomplete);
        assert!(report.verdicts.is_empty());
    }

    #[test]
    fn test_markers_match_by_containment_not_equality() {
        // Plain -x trace decoration on both markers.
        let transcript = format!(
            "++ : '{START_TEST_OUTPUT}'\n  ✓ decorated run\n++ : '{END_TEST_OUTPUT}'\n"
        );
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert!(report.is_complete());
        assert_eq!(report.verdicts.len(), 1);
    }

    #[test]
    fn test_result_lines_outside_region_are_ignored() {
        let transcript = format!(
            "  ✓ before region\n+ : '{START_TEST_OUTPUT}'\n  ✓ inside region\n+ : '{END_TEST_OUTPUT}'\n  ✓ after region\n"
        );
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert_eq!(report.verdicts.len(), 1);
        assert!(report.verdicts.contains_key("inside region"));
    }

    #[test]
    fn test_patch_rejection_detected_from_preamble() {
        let transcript = format!(
            "Checking patch tests/a.js...\nerror: patch failed: tests/a.js:10\nRejected hunk #1.\n+ : '{START_TEST_OUTPUT}'\n  ✓ unrelated pass\n+ : '{END_TEST_OUTPUT}'\n"
        );
        let report = parse_transcript(&transcript, LogParserKind::Jest);
        assert!(report.patch_rejected);
        assert!(report.is_complete());
        assert_eq!(report.verdicts.len(), 1);
    }

    #[test]
    fn test_patch_rejection_reported_even_without_markers() {
        let transcript = "error: patch failed: tests/a.js:10\nerror: tests/a.js: patch does not apply\n";
        let report = parse_transcript(transcript, LogParserKind::Jest);
        assert!(report.patch_rejected);
        assert_eq!(report.coverage, TranscriptCoverage::Incomplete);
    }

    #[test]
    fn test_kind_tags_round_trip_kebab_case() {
        let kind: LogParserKind = serde_json::from_str("\"phpunit-testdox\"").unwrap();
        assert_eq!(kind, LogParserKind::PhpunitTestdox);
        assert_eq!(
            serde_json::to_string(&LogParserKind::MochaJson).unwrap(),
            "\"mocha-json\""
        );
    }

    #[test]
    fn test_balanced_object_respects_string_escapes() {
        let text = r#"{"a":"brace \" }","b":{}} trailing"#;
        assert_eq!(balanced_object(text), Some(r#"{"a":"brace \" }","b":{}}"#));
    }
}
