use std::path::PathBuf;

use tessel_core::error::{Result, TesselError};
use tessel_core::traits::PromptSource;

/// Embedded prompt defaults, keyed by `<task>/<role>`.
fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "testcase/analyzer" => Some(TESTCASE_ANALYZER),
        "testcase/designer" => Some(TESTCASE_DESIGNER),
        "testcase/writer" => Some(TESTCASE_WRITER),
        "testcase/reviewer" => Some(TESTCASE_REVIEWER),
        "sql/analyzer" => Some(SQL_ANALYZER),
        "sql/generator" => Some(SQL_GENERATOR),
        "sql/reviewer" => Some(SQL_REVIEWER),
        "api_request/composer" => Some(API_COMPOSER),
        "api_request/reviewer" => Some(API_REVIEWER),
        _ => None,
    }
}

/// Embedded defaults only.
pub struct StaticPrompts;

impl PromptSource for StaticPrompts {
    fn load_prompt(&self, name: &str) -> Result<String> {
        builtin(name)
            .map(str::to_string)
            .ok_or_else(|| TesselError::PromptNotFound(name.to_string()))
    }
}

/// Directory overrides with embedded fallback.
///
/// `<dir>/<name>.md` wins when present; otherwise the embedded default is
/// used, so a partially-populated prompt directory stays usable.
pub struct FilePrompts {
    dir: PathBuf,
}

impl FilePrompts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl PromptSource for FilePrompts {
    fn load_prompt(&self, name: &str) -> Result<String> {
        let path = self.dir.join(format!("{}.md", name));
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(_) => StaticPrompts.load_prompt(name),
        }
    }
}

const TESTCASE_ANALYZER: &str = "\
You are a senior test analyst. Read the requirement and produce a structured \
analysis: the functional scope, the actors involved, explicit and implicit \
business rules, input constraints, and the risk areas a test suite must \
cover. Be concrete; quote the requirement where it is ambiguous.";

const TESTCASE_DESIGNER: &str = "\
You are a test designer. From the requirement analysis, derive a numbered \
list of test points grouped by functional module. Cover positive paths, \
boundary values, invalid inputs, and state transitions. Each test point is \
one line: what is exercised and why it matters.";

const TESTCASE_WRITER: &str = "\
You are a test case author. Expand the test points into complete test \
cases. For each case provide: id, title, priority (P0-P3), preconditions, \
numbered steps, expected results per step, and test data. Output a JSON \
object with a `test_cases` array grouped by module. When review feedback is \
provided, revise the previous cases to address every issue raised instead \
of starting over.";

const TESTCASE_REVIEWER: &str = "\
You are a test review expert. Score the test cases on five dimensions: \
coverage (0-30), completeness (0-25), clarity (0-20), executability (0-15), \
design (0-10). Respond with ONLY valid JSON: \
{\"quality_score\": <0-100>, \"passed\": <bool>, \"dimensions\": {...}, \
\"issues\": [..], \"suggestions\": [..]}. List concrete issues; vague \
praise helps nobody.";

const SQL_ANALYZER: &str = "\
You are a database query analyst. Given a natural-language question and an \
optional schema, identify the query intent, the entities and columns \
involved, required joins, filters, grouping, and ordering. State any \
assumption you must make about the schema.";

const SQL_GENERATOR: &str = "\
You are an SQL developer. Using the query analysis, write one SQL statement \
for the requested dialect. Use only tables and columns justified by the \
analysis, prefer explicit JOIN syntax, and never produce data-modifying \
statements. Output the SQL only, no commentary. When review feedback is \
provided, correct the previous statement accordingly.";

const SQL_REVIEWER: &str = "\
You are an SQL reviewer. Check the statement against the question and \
analysis: correctness of joins and filters, dialect validity, and safety \
(read-only). Respond with ONLY valid JSON: {\"quality_score\": <0-100>, \
\"passed\": <bool>, \"issues\": [..], \"suggestions\": [..]}.";

const API_COMPOSER: &str = "\
You are an API request planner. Given an instruction and optional API \
documentation, compose the HTTP request that fulfils it. Respond with ONLY \
valid JSON: {\"method\": .., \"path\": .., \"headers\": {..}, \
\"params\": {..}, \"body\": ..}. Use null for an absent body. When review \
feedback is provided, fix the previous request accordingly.";

const API_REVIEWER: &str = "\
You are an API request reviewer. Verify the composed request against the \
instruction and documentation: method semantics, path and parameter \
correctness, required headers, body shape. Respond with ONLY valid JSON: \
{\"quality_score\": <0-100>, \"passed\": <bool>, \"issues\": [..], \
\"suggestions\": [..]}.";
