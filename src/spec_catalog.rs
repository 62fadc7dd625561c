//! Built-in spec catalog.
//!
//! One entry per (repository, version) pair the pipeline knows how to
//! evaluate. The table is assembled once at startup by
//! [`crate::specs::SpecRegistry`] and never mutated; an overrides file can
//! replace or extend individual entries at load time.
//!
//! Version keys are arbitrary identifiers: most are dotted release numbers,
//! but e.g. phpspreadsheet keys on an upstream change number.

use crate::log_parser::LogParserKind;
use crate::specs::{RepoSpec, SpecTable};
use std::collections::BTreeMap;

pub(crate) fn catalog() -> SpecTable {
    let mut table = SpecTable::new();
    table.insert("PrismJS/prism".to_string(), prism());
    table.insert("Kong/insomnia".to_string(), insomnia());
    table.insert("openlayers/openlayers".to_string(), openlayers());
    table.insert("plotly/plotly.js".to_string(), plotly());
    table.insert("alibaba-fusion/next".to_string(), fusion_next());
    table.insert("cypress-io/cypress".to_string(), cypress());
    table.insert("Automattic/wp-calypso".to_string(), calypso());
    table.insert("carbon-design-system/carbon".to_string(), carbon());
    table.insert("scratchfoundation/scratch-gui".to_string(), scratch_gui());
    table.insert("GoogleChrome/lighthouse".to_string(), lighthouse());
    table.insert("prettier/prettier".to_string(), prettier());
    table.insert("diegomura/react-pdf".to_string(), react_pdf());
    table.insert("phpoffice/phpspreadsheet".to_string(), phpspreadsheet());
    table
}

fn same_for(versions: &[&str], spec: &RepoSpec) -> BTreeMap<String, RepoSpec> {
    versions
        .iter()
        .map(|v| ((*v).to_string(), spec.clone()))
        .collect()
}

fn prism() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(
        &["npm install"],
        "npm run test:suite --",
        LogParserKind::Mocha,
    )
    .with_node_version("14");
    same_for(&["1.20", "1.23", "1.25", "1.27", "1.29"], &spec)
}

fn insomnia() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["npm install"], "npm test", LogParserKind::Jest)
        .with_apt_pkgs(&["libfontconfig-dev"])
        .with_node_version("16");
    same_for(&["2022.4.2", "2023.1.0", "2023.4.0"], &spec)
}

fn openlayers() -> BTreeMap<String, RepoSpec> {
    let legacy = RepoSpec::new(&["npm install"], "npm run test", LogParserKind::Karma)
        .with_apt_pkgs(&["xvfb", "libgbm-dev"])
        .with_node_version("14");
    let headless = legacy.clone().with_node_version("16");
    let current = legacy.clone().with_node_version("18");

    let mut map = same_for(&["4.3", "4.5", "5.3", "6.1", "6.5.1"], &legacy);
    map.extend(same_for(&["6.9", "6.12", "7.1", "7.5"], &headless));
    map.extend(same_for(&["8.2", "9.0"], &current));
    map
}

fn plotly() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["npm install"], "npm run test-jasmine", LogParserKind::Karma)
        .with_apt_pkgs(&["xvfb"])
        .with_node_version("16");
    same_for(&["1.58", "2.14", "2.20"], &spec)
}

fn fusion_next() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["npm install"], "npm run test", LogParserKind::Jest)
        .with_apt_pkgs(&["xvfb"])
        .with_node_version("14");
    same_for(&["1.20.16", "1.25.31", "1.26.1"], &spec)
}

fn cypress() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::MochaJson)
        .with_apt_pkgs(&["xvfb", "libgtk-3-0", "libnss3", "libasound2"])
        .with_node_version("16");
    same_for(&["10.11.0", "12.5.0"], &spec)
}

fn calypso() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(
        &["npm install"],
        "npm run test-client",
        LogParserKind::Jest,
    )
    .with_node_version("10");
    same_for(
        &[
            "6.11.5", "8.9.1", "8.9.3", "8.9.4", "8.11.0", "8.11.2", "10.4.1", "10.5.0",
            "10.6.0", "10.9.0", "10.10.0", "10.12.0", "10.13.0", "10.14.0", "10.15.2",
            "10.16.3", "11.2.0",
        ],
        &spec,
    )
}

fn carbon() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::Jest)
        .with_node_version("14");
    same_for(&["10.3", "10.58", "11.2"], &spec)
}

fn scratch_gui() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["npm install"], "npx jest", LogParserKind::Jest)
        .with_node_version("16");
    same_for(&["0.1.0"], &spec)
}

fn lighthouse() -> BTreeMap<String, RepoSpec> {
    let mocha_json = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::MochaJson)
        .with_apt_pkgs(&["chromium"])
        .with_node_version("10");
    let jest_era = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::Jest)
        .with_apt_pkgs(&["chromium"])
        .with_node_version("12");
    let mocha_era = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::Mocha)
        .with_apt_pkgs(&["chromium"])
        .with_node_version("18");

    let mut map = same_for(&["2.9"], &mocha_json);
    map.extend(same_for(&["3.0", "5.6", "6.4", "8.6"], &jest_era));
    map.extend(same_for(&["9.5", "10.0", "10.2"], &mocha_era));
    map
}

fn prettier() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::Jest)
        .with_node_version("16");
    same_for(&["2.8", "3.0"], &spec)
}

fn react_pdf() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(&["yarn install"], "yarn test", LogParserKind::Jest)
        .with_apt_pkgs(&["libpixman-1-dev", "libcairo2-dev", "libpango1.0-dev"])
        .with_node_version("18");
    same_for(&["1.5", "2.3", "3.0"], &spec)
}

fn phpspreadsheet() -> BTreeMap<String, RepoSpec> {
    let spec = RepoSpec::new(
        &["composer update", "composer install"],
        "",
        LogParserKind::PhpunitTestdox,
    )
    .with_test_cmds(&[
        "./vendor/bin/phpunit --testdox --colors=never tests/PhpSpreadsheetTests/Writer/Ods/IndentTest.php",
    ])
    .with_php_version("8.3.16");
    same_for(&["4313"], &spec)
}
