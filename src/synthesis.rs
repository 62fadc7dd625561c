//! Test-command synthesis from touched paths.
//!
//! Most JavaScript test runners will not accept "run exactly these files" the
//! way Python runners do; they want name patterns, directory scopes, or
//! per-package invocations. Each registered repository therefore gets a
//! [`TestStrategy`]: classification rules that bucket the paths a test patch
//! touches, plus rendering rules that expand each bucket into shell-level
//! commands. Repositories without a registered strategy fall back to the
//! spec's static default command.
//!
//! Two invariants hold for every strategy:
//! - a path that classifies into no bucket is silently dropped, never guessed
//!   into a command;
//! - output is deduplicated and canonically ordered, so the same patch yields
//!   the same command sequence regardless of diff entry order.

use crate::diff::{self, TouchedPath};
use crate::error::Result;
use crate::instance::TaskInstance;
use crate::specs::RepoSpec;
use crate::version::{Version, VersionSpan, in_any_span};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Environment prefix that switches Node back to the legacy OpenSSL provider.
pub const OPENSSL_LEGACY_PREFIX: &str = "NODE_OPTIONS=--openssl-legacy-provider";
/// Environment prefix that keeps puppeteer from fetching its own Chromium.
pub const PUPPETEER_ENV_PREFIX: &str = "PUPPETEER_SKIP_CHROMIUM_DOWNLOAD=1";
/// Wrapper that gives browser runners a virtual display.
pub const XVFB_PREFIX: &str = "xvfb-run --server-args=\"-screen 0 1280x1024x24\"";

/// Inputs a strategy classifies and renders from.
#[derive(Debug)]
pub struct SynthesisContext<'a> {
    pub touched: &'a [TouchedPath],
    pub version: Version,
    pub spec: &'a RepoSpec,
}

/// Classification plus rendering rules for one repository convention.
pub trait TestStrategy: Send + Sync {
    /// Repository identity this strategy is registered under.
    fn repo(&self) -> &'static str;

    /// Ordered, deduplicated test commands for the touched paths. Returning
    /// an empty list tells the synthesizer to use the spec default instead.
    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String>;
}

/// Dispatch table from repository identity to strategy.
pub struct CommandSynthesizer {
    strategies: BTreeMap<&'static str, Box<dyn TestStrategy>>,
}

impl CommandSynthesizer {
    /// Table with every built-in convention registered.
    #[must_use]
    pub fn with_builtin_strategies() -> Self {
        let mut synthesizer = Self {
            strategies: BTreeMap::new(),
        };
        synthesizer.register(Box::new(PrismStrategy));
        synthesizer.register(Box::new(InsomniaStrategy));
        synthesizer.register(Box::new(OpenLayersStrategy));
        synthesizer.register(Box::new(PlotlyStrategy));
        synthesizer.register(Box::new(FusionNextStrategy));
        synthesizer.register(Box::new(CypressStrategy));
        synthesizer.register(Box::new(CalypsoStrategy));
        synthesizer.register(Box::new(CarbonStrategy));
        synthesizer.register(Box::new(ScratchGuiStrategy));
        synthesizer.register(Box::new(LighthouseStrategy));
        synthesizer.register(Box::new(PrettierStrategy));
        synthesizer.register(Box::new(ReactPdfStrategy));
        synthesizer
    }

    /// Register (or replace) the strategy for one repository.
    pub fn register(&mut self, strategy: Box<dyn TestStrategy>) {
        self.strategies.insert(strategy.repo(), strategy);
    }

    #[must_use]
    pub fn strategy_for(&self, repo: &str) -> Option<&dyn TestStrategy> {
        self.strategies.get(repo).map(Box::as_ref)
    }

    /// Repositories with a registered strategy, sorted.
    pub fn repos(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.keys().copied()
    }

    /// Synthesize the ordered test-command list for one instance.
    ///
    /// Malformed diffs fail here, before any command exists. An unregistered
    /// repository, or a strategy whose classification produced nothing, falls
    /// back to the spec's static default so the evaluation stage is never
    /// empty.
    pub fn synthesize(&self, instance: &TaskInstance, spec: &RepoSpec) -> Result<Vec<String>> {
        let touched = diff::touched_paths(&instance.test_patch)?;
        let Some(strategy) = self.strategies.get(instance.repo.as_str()) else {
            tracing::debug!(repo = %instance.repo, "no specialized strategy; using spec default");
            return Ok(spec.test_cmd.commands());
        };

        let ctx = SynthesisContext {
            touched: &touched,
            version: Version::parse(&instance.version),
            spec,
        };
        let commands = strategy.commands(&ctx);
        if commands.is_empty() {
            tracing::debug!(
                repo = %instance.repo,
                paths = touched.len(),
                "classification produced no commands; using spec default"
            );
            return Ok(spec.test_cmd.commands());
        }
        tracing::debug!(repo = %instance.repo, commands = commands.len(), "synthesized test commands");
        Ok(commands)
    }
}

// MARK: shared helpers

/// Deduplicate and canonically order independent commands.
fn canonical(commands: impl IntoIterator<Item = String>) -> Vec<String> {
    let set: BTreeSet<String> = commands.into_iter().collect();
    set.into_iter().collect()
}

/// Deduplicate command groups, order them by their leading command, and
/// flatten. Groups keep their internal order (cd, run, cd back).
fn canonical_groups(groups: impl IntoIterator<Item = Vec<String>>) -> Vec<String> {
    let set: BTreeSet<Vec<String>> = groups.into_iter().collect();
    set.into_iter().flatten().collect()
}

fn snapshot_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__snapshots__/(.*)\.js\.snap$").expect("snapshot regex"))
}

/// Jest snapshots are never run directly: `pkg/a/__snapshots__/x.js.snap`
/// rewrites to the owning directory `pkg/a` before classification.
fn strip_snapshot_segment(path: &str) -> String {
    if snapshot_suffix().is_match(path) {
        let parts: Vec<&str> = path.split('/').collect();
        parts[..parts.len().saturating_sub(2)].join("/")
    } else {
        path.to_string()
    }
}

/// Everything before the first occurrence of `needle` (the whole path when
/// absent), matching the prefix-truncation conventions below.
fn truncate_at(path: &str, needle: &str) -> String {
    path.split(needle).next().unwrap_or(path).to_string()
}

/// Leading `count` path segments joined, when at least that many exist.
fn leading_segments(path: &TouchedPath, count: usize) -> Option<String> {
    let segments: Vec<&str> = path.as_str().split('/').collect();
    if segments.len() < count {
        return None;
    }
    Some(segments[..count].join("/"))
}

/// Split into (leading `count` segments, non-empty remainder).
fn split_after(path: &TouchedPath, count: usize) -> Option<(String, String)> {
    let segments: Vec<&str> = path.as_str().split('/').collect();
    if segments.len() <= count {
        return None;
    }
    Some((segments[..count].join("/"), segments[count..].join("/")))
}

// MARK: PrismJS/prism

/// The prism suite runner takes `--language` filters derived from the fixture
/// tree; one core file carries its own mocha invocation; the HTML demo page
/// runs nothing.
pub struct PrismStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PrismBucket {
    Language(String),
    CoreGreedy,
}

impl PrismStrategy {
    fn classify(path: &TouchedPath) -> Option<PrismBucket> {
        if path.has_prefix("tests/languages") {
            return path
                .segment(2)
                .map(|lang| PrismBucket::Language(lang.to_string()));
        }
        if path.as_str() == "tests/core/greedy.js" {
            return Some(PrismBucket::CoreGreedy);
        }
        None
    }
}

impl TestStrategy for PrismStrategy {
    fn repo(&self) -> &'static str {
        "PrismJS/prism"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        let default_cmd = ctx.spec.test_cmd.primary();
        canonical(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(|bucket| match bucket {
                    PrismBucket::Language(lang) => format!("{default_cmd} --language {lang}"),
                    PrismBucket::CoreGreedy => {
                        "./node_modules/.bin/mocha tests/core/**/*.js --reporter json".to_string()
                    }
                }),
        )
    }
}

// MARK: Kong/insomnia

/// Each touched workspace package gets a self-contained install/build/test
/// subshell that restores the working directory on the way out.
pub struct InsomniaStrategy;

impl TestStrategy for InsomniaStrategy {
    fn repo(&self) -> &'static str {
        "Kong/insomnia"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        let packages: BTreeSet<&str> = ctx
            .touched
            .iter()
            .filter(|path| path.has_prefix("packages/"))
            .filter_map(|path| path.segment(1))
            .filter(|pkg| !pkg.is_empty())
            .collect();
        packages
            .into_iter()
            .map(|pkg| {
                format!(
                    "(cd packages/{pkg} && npm install && npm run build && npm run test; \
                     exit_code=$?; cd ../..; exit $exit_code)"
                )
            })
            .collect()
    }
}

// MARK: openlayers/openlayers

/// Test paths are `tests/<type>/...`; the type selects the sub-runner.
/// Browser testing moved to headless chrome for a span of releases, and a
/// span of older releases needs Node's legacy OpenSSL provider for anything
/// browser-shaped.
pub struct OpenLayersStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenLayersBucket {
    Browser,
    Rendering,
    Spec,
    Node,
    Other,
}

impl OpenLayersStrategy {
    fn headless_chrome_spans() -> Vec<VersionSpan> {
        vec![VersionSpan::new("6.9", "7.5")]
    }

    fn legacy_openssl_spans() -> Vec<VersionSpan> {
        vec![
            VersionSpan::new("6.1", "6.6"),
            VersionSpan::new("5.1", "5.3"),
            VersionSpan::new("4.3", "4.6"),
        ]
    }

    fn classify(path: &TouchedPath) -> Option<OpenLayersBucket> {
        Some(match path.segment(1)? {
            "browser" => OpenLayersBucket::Browser,
            "rendering" => OpenLayersBucket::Rendering,
            "spec" => OpenLayersBucket::Spec,
            "node" => OpenLayersBucket::Node,
            _ => OpenLayersBucket::Other,
        })
    }

    fn render(bucket: OpenLayersBucket, version: &Version) -> String {
        let base = match bucket {
            OpenLayersBucket::Browser => {
                if in_any_span(&Self::headless_chrome_spans(), version) {
                    r#"su chromeuser -c "npm run test-browser""#.to_string()
                } else {
                    format!(
                        r#"{PUPPETEER_ENV_PREFIX} {XVFB_PREFIX} su chromeuser -c "npm run test-browser""#
                    )
                }
            }
            OpenLayersBucket::Rendering => format!(
                r#"{PUPPETEER_ENV_PREFIX} {XVFB_PREFIX} su chromeuser -c "npm run test-rendering""#
            ),
            OpenLayersBucket::Spec => format!(
                r#"{PUPPETEER_ENV_PREFIX} {XVFB_PREFIX} su chromeuser -c "npm run karma -- --single-run --log-level error""#
            ),
            OpenLayersBucket::Node => "npm run test-node".to_string(),
            OpenLayersBucket::Other => "npm run test".to_string(),
        };

        let browser_shaped = matches!(
            bucket,
            OpenLayersBucket::Browser | OpenLayersBucket::Rendering | OpenLayersBucket::Spec
        );
        if browser_shaped && in_any_span(&Self::legacy_openssl_spans(), version) {
            format!("{OPENSSL_LEGACY_PREFIX} {base}")
        } else {
            base
        }
    }
}

impl TestStrategy for OpenLayersStrategy {
    fn repo(&self) -> &'static str {
        "openlayers/openlayers"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(|bucket| Self::render(bucket, &ctx.version)),
        )
    }
}

// MARK: plotly/plotly.js

/// The jasmine runner takes bare suite names: file stems with the `_test`
/// suffix stripped, all passed to a single invocation.
pub struct PlotlyStrategy;

impl TestStrategy for PlotlyStrategy {
    fn repo(&self) -> &'static str {
        "plotly/plotly.js"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        let stems: BTreeSet<String> = ctx
            .touched
            .iter()
            .map(|path| {
                let stem = path.stem();
                stem.strip_suffix("_test").unwrap_or(stem).to_string()
            })
            .filter(|stem| !stem.is_empty())
            .collect();
        if stems.is_empty() {
            return Vec::new();
        }
        let suites = stems.into_iter().collect::<Vec<_>>().join(" ");
        vec![format!("{} -- {suites}", ctx.spec.test_cmd.primary())]
    }
}

// MARK: alibaba-fusion/next

/// One headless component-suite run per touched `test/<component>/...` tree,
/// time-boxed because single component suites can hang the display wrapper.
pub struct FusionNextStrategy;

impl TestStrategy for FusionNextStrategy {
    fn repo(&self) -> &'static str {
        "alibaba-fusion/next"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical(ctx.touched.iter().filter_map(|path| {
            let component = path.segment(1)?;
            Some(format!(
                "timeout 2m bash -c '{PUPPETEER_ENV_PREFIX} {XVFB_PREFIX} \
                 su chromeuser -c \"npm run test {component}\"'"
            ))
        }))
    }
}

// MARK: cypress-io/cypress

/// Driver and extension packages run through the cypress runner itself;
/// everything else (server, launchpad) runs `yarn test` under a virtual
/// display. Both shapes are cd/run/cd-back groups keyed by the package
/// directory.
pub struct CypressStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CypressBucket {
    Runner { folder: String, spec_path: String },
    Browser { folder: String, spec_path: String },
}

impl CypressStrategy {
    fn classify(path: &TouchedPath) -> Option<CypressBucket> {
        let (folder, spec_path) = split_after(path, 2)?;
        if path.has_prefix("packages/driver") || path.has_prefix("packages/extension") {
            Some(CypressBucket::Runner { folder, spec_path })
        } else {
            Some(CypressBucket::Browser { folder, spec_path })
        }
    }

    fn render(bucket: CypressBucket) -> Vec<String> {
        match bucket {
            CypressBucket::Runner { folder, spec_path } => vec![
                format!("cd {folder}"),
                format!(
                    "yarn workspace @{folder} cypress:run --spec {spec_path} --reporter json"
                ),
                "cd ../..".to_string(),
            ],
            CypressBucket::Browser { folder, spec_path } => vec![
                format!("cd {folder}"),
                format!("{XVFB_PREFIX} su chromeuser -c \"yarn test {spec_path} --reporter json\""),
                "cd ../..".to_string(),
            ],
        }
    }
}

impl TestStrategy for CypressStrategy {
    fn repo(&self) -> &'static str {
        "cypress-io/cypress"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical_groups(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(Self::render),
        )
    }
}

// MARK: Automattic/wp-calypso

/// Snapshot paths rewrite to their owning directory first. Client and package
/// trees run jest with a per-package config whose file name changed across
/// release spans; the e2e tree runs in its own directory with a test
/// environment selected.
pub struct CalypsoStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CalypsoBucket {
    Package { pkg: String, path: String },
    EndToEnd { path: String },
}

impl CalypsoStrategy {
    fn jest_config_js_spans() -> Vec<VersionSpan> {
        vec![VersionSpan::new("10.10.0", "10.16.3")]
    }

    fn jest_config_json_spans() -> Vec<VersionSpan> {
        vec![
            VersionSpan::new("10.4.1", "10.9.0"),
            VersionSpan::new("8.9.1", "8.11.2"),
            VersionSpan::single("6.11.5"),
        ]
    }

    fn classify(path: &TouchedPath) -> Option<CalypsoBucket> {
        let logical = strip_snapshot_segment(path.as_str());
        if logical.starts_with("client") || logical.starts_with("packages") {
            let pkg = logical.split('/').next().unwrap_or("").to_string();
            if pkg.is_empty() {
                return None;
            }
            return Some(CalypsoBucket::Package { pkg, path: logical });
        }
        if logical.starts_with("test/e2e") {
            return Some(CalypsoBucket::EndToEnd { path: logical });
        }
        None
    }

    fn render(bucket: CalypsoBucket, version: &Version) -> Vec<String> {
        match bucket {
            CalypsoBucket::Package { pkg, path } => {
                let cmd = if in_any_span(&Self::jest_config_js_spans(), version) {
                    format!("./node_modules/.bin/jest --verbose -c=test/{pkg}/jest.config.js '{path}'")
                } else if in_any_span(&Self::jest_config_json_spans(), version) {
                    format!("./node_modules/.bin/jest --verbose -c=test/{pkg}/jest.config.json '{path}'")
                } else {
                    format!("npm run test-{pkg} --verbose '{path}'")
                };
                vec![cmd]
            }
            CalypsoBucket::EndToEnd { path } => vec![
                "cd test/e2e".to_string(),
                format!("NODE_CONFIG_ENV=test npm run test {path}"),
                "cd ../..".to_string(),
            ],
        }
    }
}

impl TestStrategy for CalypsoStrategy {
    fn repo(&self) -> &'static str {
        "Automattic/wp-calypso"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical_groups(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(|bucket| Self::render(bucket, &ctx.version)),
        )
    }
}

// MARK: carbon-design-system/carbon

/// The jest wrapper takes directory scopes: snapshots rewrite to the owning
/// directory and `__tests__` trees truncate to their parent.
pub struct CarbonStrategy;

impl CarbonStrategy {
    fn logical_path(path: &TouchedPath) -> String {
        let rewritten = strip_snapshot_segment(path.as_str());
        if rewritten.contains("__tests__") {
            truncate_at(&rewritten, "__tests__")
        } else {
            rewritten
        }
    }
}

impl TestStrategy for CarbonStrategy {
    fn repo(&self) -> &'static str {
        "carbon-design-system/carbon"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical(
            ctx.touched
                .iter()
                .map(Self::logical_path)
                .filter(|path| !path.is_empty())
                .map(|path| format!("yarn test {path}")),
        )
    }
}

// MARK: scratchfoundation/scratch-gui

pub struct ScratchGuiStrategy;

impl TestStrategy for ScratchGuiStrategy {
    fn repo(&self) -> &'static str {
        "scratchfoundation/scratch-gui"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        let prefix = ctx.spec.test_cmd.primary().to_string();
        canonical(
            ctx.touched
                .iter()
                .map(|path| truncate_at(path.as_str(), "__snapshots__"))
                .filter(|path| !path.is_empty())
                .map(|path| format!("{prefix} {path}")),
        )
    }
}

// MARK: GoogleChrome/lighthouse

/// Three runner eras: a modern span with per-subtree unit scripts, a long
/// jest span, and mocha with the JSON reporter before that. Markup, data, and
/// smoke-test files never select anything.
pub struct LighthouseStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LighthouseBucket {
    FlowReport,
    UnitDir(String),
    Other,
}

impl LighthouseStrategy {
    const EXCLUDED_SUFFIXES: [&'static str; 4] = [".html", ".json", ".md", ".txt"];
    const UNIT_DIRS: [&'static str; 4] = ["report", "cli", "treemap", "viewer"];
    const DIR_PREFIX: &'static str = "lighthouse-";

    fn modern_spans() -> Vec<VersionSpan> {
        vec![VersionSpan::new("9.5", "10.2")]
    }

    fn jest_spans() -> Vec<VersionSpan> {
        vec![VersionSpan::new("3.0", "8.6")]
    }

    fn classify(path: &TouchedPath) -> Option<(LighthouseBucket, String)> {
        if path.ends_with_any(&Self::EXCLUDED_SUFFIXES) || path.as_str().contains("smokehouse") {
            return None;
        }
        let parent = path.segment(0)?;
        let bucket = if parent == "flow-report" {
            LighthouseBucket::FlowReport
        } else {
            let stripped = parent.strip_prefix(Self::DIR_PREFIX).unwrap_or(parent);
            if Self::UNIT_DIRS.contains(&stripped) {
                LighthouseBucket::UnitDir(stripped.to_string())
            } else {
                LighthouseBucket::Other
            }
        };
        Some((bucket, path.as_str().to_string()))
    }

    fn render(bucket: LighthouseBucket, path: &str, version: &Version) -> String {
        if in_any_span(&Self::modern_spans(), version) {
            match bucket {
                LighthouseBucket::FlowReport => "yarn unit-flow".to_string(),
                LighthouseBucket::UnitDir(dir) => format!("yarn unit-{dir} {path}"),
                LighthouseBucket::Other => format!("yarn mocha {path}"),
            }
        } else if in_any_span(&Self::jest_spans(), version) {
            format!("yarn jest --no-colors {path}")
        } else {
            format!("./node_modules/.bin/mocha --reporter json {path}")
        }
    }
}

impl TestStrategy for LighthouseStrategy {
    fn repo(&self) -> &'static str {
        "GoogleChrome/lighthouse"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(|(bucket, path)| Self::render(bucket, &path, &ctx.version)),
        )
    }
}

// MARK: prettier/prettier

/// Snapshot paths truncate to their owning directory; markdown format
/// fixtures select the directory that contains them.
pub struct PrettierStrategy;

impl PrettierStrategy {
    fn logical_path(path: &TouchedPath) -> Option<String> {
        let truncated = truncate_at(path.as_str(), "__snapshots__");
        let logical = if truncated.ends_with(".md") {
            truncated
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_default()
        } else {
            truncated
        };
        if logical.is_empty() { None } else { Some(logical) }
    }
}

impl TestStrategy for PrettierStrategy {
    fn repo(&self) -> &'static str {
        "prettier/prettier"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        canonical(
            ctx.touched
                .iter()
                .filter_map(Self::logical_path)
                .map(|path| format!("yarn test {path}")),
        )
    }
}

// MARK: diegomura/react-pdf

/// Package trees scope to their two-segment package directory; the shared
/// integration tree reruns the whole default command; rendered-output images
/// select nothing.
pub struct ReactPdfStrategy;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReactPdfBucket {
    Package(String),
    SuiteRoot,
}

impl ReactPdfStrategy {
    fn classify(path: &TouchedPath) -> Option<ReactPdfBucket> {
        if path.ends_with_any(&[".png"]) {
            return None;
        }
        if path.has_prefix("packages/") {
            return leading_segments(path, 2).map(ReactPdfBucket::Package);
        }
        if path.has_prefix("tests/") {
            return Some(ReactPdfBucket::SuiteRoot);
        }
        None
    }
}

impl TestStrategy for ReactPdfStrategy {
    fn repo(&self) -> &'static str {
        "diegomura/react-pdf"
    }

    fn commands(&self, ctx: &SynthesisContext<'_>) -> Vec<String> {
        let prefix = ctx.spec.test_cmd.primary().to_string();
        canonical(
            ctx.touched
                .iter()
                .filter_map(Self::classify)
                .map(|bucket| match bucket {
                    ReactPdfBucket::Package(folder) => format!("{prefix} {folder}"),
                    ReactPdfBucket::SuiteRoot => prefix.clone(),
                }),
        )
    }
}
