//! Unit tests for sapling-indexer

use std::path::{Path, PathBuf};

use sapling_core::{EdgeKind, Language, NodeKind};

use crate::test_utils::create_repo_with_structure;
use crate::*;

const A_PY: &str = "class Foo:\n    pass\n\ndef bar():\n    return 1\n";
const B_PY: &str = "import a\n\ndef main():\n    bar()\n";

fn relationship_lines(context: &IndexContext) -> String {
    context
        .store()
        .relationship_names()
        .unwrap()
        .into_iter()
        .map(|(kind, source, target)| format!("{kind} {source} -> {target}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn test_toolchain_dispatches_on_extension() {
    let mut toolchain = Toolchain::new().unwrap();
    let cases = [
        ("lib.py", Language::Python, 2),
        ("app.js", Language::JavaScript, 2),
        ("app.ts", Language::TypeScript, 2),
        ("View.tsx", Language::TypeScript, 2),
        ("settings.yml", Language::Yaml, 1),
    ];
    let sources = [
        "def f():\n    pass\n",
        "function f() {}\n",
        "function f(): void {}\n",
        "export function F() { return <div/>; }\n",
        "key: value\n",
    ];

    for ((file, language, nodes), source) in cases.into_iter().zip(sources) {
        let fragment = toolchain.parse(Path::new(file), source).unwrap();
        assert_eq!(fragment.language, language, "{file}");
        assert_eq!(fragment.node_count(), nodes, "{file}");
        assert_eq!(fragment.nodes[0].kind, NodeKind::File, "{file}");
    }
}

#[test]
fn test_toolchain_attaches_findings() {
    let mut toolchain = Toolchain::new().unwrap();
    let fragment = toolchain
        .parse(
            Path::new("db.py"),
            "import psycopg2\nDSN = \"postgresql://svc@orders.staging.local/orders\"\n",
        )
        .unwrap();
    assert!(fragment.findings.database);
    assert!(fragment.findings.environments.contains("staging"));
}

#[test]
fn test_index_links_files() {
    let repo = create_repo_with_structure(&[("a.py", A_PY), ("b.py", B_PY)]);
    let context = IndexContext::open(repo.path()).unwrap();
    let stats = context.index(&IndexOptions::default()).unwrap();

    assert_eq!(stats.files, 2);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.cached, 0);
    assert_eq!(stats.failed, 0);
    insta::assert_snapshot!(relationship_lines(&context), @r"
    calls main -> bar
    contains a.py -> Foo
    contains a.py -> bar
    contains b.py -> main
    imports b.py -> a
    imports b.py -> a.py
    ");
}

#[test]
fn test_second_run_is_served_from_cache() {
    let repo = create_repo_with_structure(&[("a.py", A_PY), ("b.py", B_PY)]);
    let context = IndexContext::open(repo.path()).unwrap();
    let first = context.index(&IndexOptions::default()).unwrap();
    let before = relationship_lines(&context);

    let second = context.index(&IndexOptions::default()).unwrap();
    assert_eq!(second.cached, 2);
    assert_eq!(second.processed, 0);
    assert_eq!((second.nodes, second.edges), (first.nodes, first.edges));
    assert_eq!(relationship_lines(&context), before);

    let forced = context.index(&IndexOptions { force: true }).unwrap();
    assert_eq!(forced.cached, 0);
    assert_eq!(forced.processed, 2);
}

#[test]
fn test_changed_file_is_reparsed() {
    let repo = create_repo_with_structure(&[("a.py", A_PY), ("b.py", B_PY)]);
    let context = IndexContext::open(repo.path()).unwrap();
    context.index(&IndexOptions::default()).unwrap();

    std::fs::write(repo.path().join("b.py"), "import a\n\ndef main():\n    Foo()\n").unwrap();
    let stats = context.index(&IndexOptions::default()).unwrap();
    assert_eq!(stats.cached, 1);
    assert_eq!(stats.processed, 1);

    let lines = relationship_lines(&context);
    assert!(lines.contains("uses main -> Foo"));
    assert!(!lines.contains("calls main -> bar"));
}

#[test]
fn test_missing_file_is_reported_and_rest_persisted() {
    let repo = create_repo_with_structure(&[("a.py", A_PY), ("b.py", B_PY)]);
    let context = IndexContext::open(repo.path()).unwrap();
    let root = context.root().to_path_buf();
    let paths: Vec<PathBuf> = vec![root.join("a.py"), root.join("b.py"), root.join("gone.py")];

    let stats = context.index_paths(&paths, &IndexOptions::default()).unwrap();
    assert_eq!(stats.files, 3);
    assert_eq!(stats.failed, 1);
    assert!(stats.warnings.iter().any(|w| w.contains("gone.py")));

    let (nodes, _) = context.store().counts().unwrap();
    assert_eq!(nodes, stats.nodes);
    assert!(relationship_lines(&context).contains("calls main -> bar"));
}

#[test]
fn test_config_excludes_and_reports_bad_root() {
    let repo = create_repo_with_structure(&[
        ("sapling.toml", "[indexer]\nexclude = [\"legacy/**\"]\nmax_workers = 2\n"),
        ("app.py", "def run():\n    pass\n"),
        ("legacy/old.py", "def run_old():\n    pass\n"),
    ]);
    let stats = index(repo.path(), &IndexOptions::default()).unwrap();
    // app.py and sapling.toml itself
    assert_eq!(stats.files, 2);

    let missing = repo.path().join("nope");
    assert!(matches!(
        index(&missing, &IndexOptions::default()),
        Err(IndexError::RootNotFound(_))
    ));
}

#[test]
fn test_cross_file_inheritance_and_import_edges() {
    let repo = create_repo_with_structure(&[
        ("models.py", "class Base:\n    pass\n"),
        ("shop.py", "from models import Base\n\nclass Cart(Base):\n    pass\n"),
    ]);
    let context = IndexContext::open(repo.path()).unwrap();
    context.index(&IndexOptions::default()).unwrap();

    let lines = relationship_lines(&context);
    assert!(lines.contains(&format!("{} Cart -> Base", EdgeKind::Inherits.as_str())));
    assert!(lines.contains("imports shop.py -> models.py"));
}
