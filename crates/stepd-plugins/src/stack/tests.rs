use std::fs;
use std::path::Path;

use super::*;
use crate::load::FnLoader;
use crate::plugin::{FnPlugin, SpankOption};

fn entry(path: &str, required: bool, argv: &[&str]) -> StackEntry {
    StackEntry {
        path: path.to_string(),
        required,
        argv: argv.iter().map(|s| s.to_string()).collect(),
    }
}

fn loader_with(paths: &[&str]) -> FnLoader {
    let mut loader = FnLoader::new();
    for path in paths {
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        loader.register(*path, move || {
            let plugin = FnPlugin::new(name.clone())
                .hook(crate::Phase::Init, |_, _| 0)
                .option(SpankOption::flag(format!("{name}-opt"), "demo option"));
            Ok(Box::new(plugin) as Box<dyn SpankPlugin>)
        });
    }
    loader
}

#[test]
fn parses_directives() {
    assert_eq!(
        parse_line("required /path/to/a.so arg1 arg2"),
        Ok(Some(entry("/path/to/a.so", true, &["arg1", "arg2"])))
    );
    assert_eq!(
        parse_line("optional\trel.so # trailing comment\n"),
        Ok(Some(entry("rel.so", false, &[])))
    );
    assert_eq!(parse_line("# comment"), Ok(None));
    assert_eq!(parse_line(""), Ok(None));
    assert_eq!(parse_line("   \t "), Ok(None));
}

#[test]
fn keyword_is_a_case_insensitive_prefix() {
    assert_eq!(
        parse_line("REQ a.so"),
        Ok(Some(entry("a.so", true, &[])))
    );
    assert_eq!(parse_line("opt a.so"), Ok(Some(entry("a.so", false, &[]))));
    assert_eq!(
        parse_line("maybe /path"),
        Err(ParseError::BadKeyword("maybe".to_string()))
    );
    assert_eq!(
        parse_line("requiredx /path"),
        Err(ParseError::BadKeyword("requiredx".to_string()))
    );
    assert_eq!(
        parse_line("required   # no path"),
        Err(ParseError::MissingPath("required".to_string()))
    );
}

#[test]
fn relative_paths_search_the_plugin_dirs() {
    let loader = loader_with(&["/opt/b/demo.so"]);
    assert_eq!(
        resolve_path("demo.so", "/opt/a::/opt/b", &loader),
        PathBuf::from("/opt/b/demo.so")
    );
    assert_eq!(
        resolve_path("other.so", "/opt/a:/opt/b", &loader),
        PathBuf::from("other.so")
    );
    assert_eq!(
        resolve_path("/abs/demo.so", "/opt/b", &loader),
        PathBuf::from("/abs/demo.so")
    );
}

#[test]
fn missing_config_is_an_empty_stack() {
    let dir = tempfile::tempdir().unwrap();
    let stack =
        PluginStack::load(&dir.path().join("plugstack.conf"), "", &FnLoader::new()).unwrap();
    assert!(stack.is_empty());
}

#[test]
fn unreadable_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = PluginStack::load(dir.path(), "", &FnLoader::new());
    assert!(matches!(result, Err(Error::IoAt { .. })));
}

#[test]
fn loads_entries_in_order_and_caches_options() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("plugstack.conf");
    fs::write(
        &config,
        "# site plugins\n\
         required first.so level=3\n\
         bogus line here\n\
         optional /missing/none.so\n\
         optional second.so\n",
    )
    .unwrap();

    let loader = loader_with(&["/lib/spank/first.so", "/lib/spank/second.so"]);
    let stack = PluginStack::load(&config, "/lib/spank", &loader).unwrap();

    let names: Vec<_> = stack.plugins().iter().map(PluginRecord::name).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert!(stack.plugins()[0].required());
    assert_eq!(stack.plugins()[0].argv(), ["level=3".to_string()]);
    assert_eq!(stack.plugins()[1].path(), Path::new("/lib/spank/second.so"));

    let options: Vec<_> = stack
        .options()
        .records()
        .iter()
        .map(|r| (r.name().to_string(), r.plugin().to_string()))
        .collect();
    assert_eq!(
        options,
        vec![
            ("first-opt".to_string(), "first".to_string()),
            ("second-opt".to_string(), "second".to_string()),
        ]
    );
}

#[test]
fn required_load_failure_discards_the_whole_stack() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("plugstack.conf");
    fs::write(
        &config,
        "optional /lib/spank/good.so\nrequired /lib/spank/broken.so\n",
    )
    .unwrap();

    let loader = loader_with(&["/lib/spank/good.so"]);
    let err = PluginStack::load(&config, "", &loader)
        .err()
        .expect("required failure must abort");
    assert!(matches!(err, Error::RequiredPlugin { line: 2, .. }));

    let mut stack = PluginStack::default();
    assert!(stack.load_config(&config, "", &loader).is_err());
    assert!(stack.is_empty());
    assert!(stack.options().is_empty());
}
