use std::path::PathBuf;

use plancast_core::types::{Plan, Step};

/// Two-step software plan whose second step waits on legal.
pub fn e2e_plan_toml() -> &'static str {
    r#"goal = "Ship the public API"
domain = "software"

[[steps]]
id = "A"
text = "Design schema"

[[steps]]
id = "B"
text = "Build API, depends on approval from legal with expected delay"
depends_on = ["A"]
"#
}

/// [`e2e_plan_toml`] as a parsed plan.
pub fn e2e_plan() -> Plan {
    Plan::new(
        "Ship the public API",
        vec![
            Step::new("A", "Design schema"),
            Step::new(
                "B",
                "Build API, depends on approval from legal with expected delay",
            )
            .depends_on("A"),
        ],
    )
    .with_metadata("domain", "software")
}

/// A -> {B, C} -> D with durations; C is the heavier branch.
pub fn diamond_plan() -> Plan {
    Plan::new(
        "Kitchen renovation",
        vec![
            Step::new("A", "Get building permit").with_hours(8.0),
            Step::new("B", "Order cabinets").with_hours(2.0).depends_on("A"),
            Step::new("C", "Demolish old kitchen").with_hours(16.0).depends_on("A"),
            Step::new("D", "Install cabinets").with_hours(6.0).depends_on("B").depends_on("C"),
        ],
    )
    .with_metadata("domain", "renovation")
}

/// a -> b -> c -> a
pub fn cyclic_plan_toml() -> &'static str {
    r#"goal = "Loop"

[[steps]]
id = "a"
text = "first"
depends_on = ["c"]

[[steps]]
id = "b"
text = "second"
depends_on = ["a"]

[[steps]]
id = "c"
text = "third"
depends_on = ["b"]
"#
}

/// Write `contents` into a fresh temp dir; keep the dir alive while the path
/// is in use.
pub fn write_temp(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write temp file");
    (dir, path)
}
