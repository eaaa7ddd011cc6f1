///
/// # Integration Tests for rewrite plans
///
/// Plans written to disk, loaded, built and run through the redirect pass.
///

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use shuntc::routine::{Budget, RoutineError};
use shuntc::{CollectingSink, Plan, PlanError, RedirectError};

fn write_plan(dir: &Path, file: &str, redirects: &str) -> std::path::PathBuf {
    let content = format!(
        r#"[routine]
owner = "com/example/Foo"
name = "tick"
descriptor = "(Lcom/example/World;)V"
max_stack = 3
code = """
aload 1
iconst 1
iconst 2
invokevirtual com/example/World.bar(II)Z
pop
return
"""

{}"#,
        redirects
    );
    let path = dir.join(file);
    fs::write(&path, content).expect("Failed to write plan");
    path
}

#[test]
fn test_load_build_and_run_toml_plan() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_plan(
        temp_dir.path(),
        "tick.toml",
        r#"[redirect.weak]
handler = "com/example/Hooks.weak(Lcom/example/World;II)Z"
static = true
priority = 10
target = "invokevirtual com/example/World.bar(II)Z"

[redirect.strong]
handler = "com/example/Hooks.strong(Lcom/example/World;IILcom/example/World;)Z"
static = true
priority = 20
target = "invokevirtual com/example/World.bar(II)Z"
"#,
    );

    let plan = Plan::load(&path).expect("Failed to load plan");
    let planned = plan.build().expect("Failed to build plan");
    let mut routine = planned.routine;
    let mut sink = CollectingSink::new();
    let report = planned.pass.run(&mut routine, &mut sink).expect("Pass failed");

    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].engine, "strong");
    assert_eq!(report.skipped, vec!["weak".to_string()]);
    assert_eq!(sink.conflicts.len(), 1);

    insta::assert_snapshot!(routine.insns().to_string(), @r"
    aload 1
    iconst 1
    iconst 2
    istore 4
    istore 3
    astore 2
    aload 2
    iload 3
    iload 4
    aload 1
    invokestatic com/example/Hooks.strong(Lcom/example/World;IILcom/example/World;)Z
    pop
    return
    ");
    assert_eq!(report.max_stack, 3 + 1 + 1);
    assert_eq!(report.max_locals, 2 + 3 + 4);
}

#[test]
fn test_load_json_plan() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("count.json");
    fs::write(
        &path,
        r#"{
            "routine": {
                "owner": "a/A", "name": "m", "descriptor": "()I",
                "max_stack": 1, "code": "getstatic a/A.count:I\nireturn"
            },
            "redirect": {
                "count": { "handler": "h/H.count()I", "target": "getstatic a/A.count:I" }
            }
        }"#,
    )
    .expect("Failed to write plan");

    let planned = Plan::load(&path).unwrap().build().unwrap();
    let mut routine = planned.routine;
    let report = planned.pass.run(&mut routine, &mut CollectingSink::new()).unwrap();

    assert_eq!(routine.insns().to_string(), "aload 0\ninvokevirtual h/H.count()I\nireturn\n");
    assert_eq!(report.max_stack, 2);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["applied"][0]["engine"], "count");
    assert_eq!(json["max_stack"], 2);
}

#[test]
fn test_missing_plan_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let result = Plan::load(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(PlanError::Io(_))));
}

#[test]
fn test_malformed_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[routine\nowner = ").unwrap();
    assert!(matches!(Plan::load(&path), Err(PlanError::Toml(_))));
}

#[test]
fn test_target_without_match() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_plan(
        temp_dir.path(),
        "tick.toml",
        r#"[redirect.ghost]
handler = "com/example/Hooks.ghost()I"
static = true
target = "getstatic com/example/World.ghost:I"
"#,
    );

    let err = Plan::load(&path).unwrap().build().err().expect("build should fail");
    assert!(matches!(err, PlanError::NoTargetMatch { .. }));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_signature_mismatch_leaves_routine_untouched() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_plan(
        temp_dir.path(),
        "tick.toml",
        r#"[redirect.wrong]
handler = "com/example/Hooks.wrong(II)Z"
static = true
target = "invokevirtual com/example/World.bar(II)Z"
"#,
    );

    let planned = Plan::load(&path).unwrap().build().unwrap();
    let mut routine = planned.routine;
    let before = routine.insns().to_string();
    let mut sink = CollectingSink::new();

    let err = planned.pass.run(&mut routine, &mut sink).unwrap_err();
    assert!(err.to_string().contains("handler method wrong has an invalid signature"));
    assert_eq!(sink.fatals.len(), 1);
    assert_eq!(routine.insns().to_string(), before);
}

fn write_raw(dir: &Path, file: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(file);
    fs::write(&path, content).expect("Failed to write plan");
    path
}

#[test]
fn test_default_locals_keep_code_slots_live() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_raw(
        temp_dir.path(),
        "clamp.toml",
        r#"[routine]
owner = "a/A"
name = "run"
descriptor = "()I"
static = true
max_stack = 1
code = """
iconst 9
istore 0
iconst 1
invokestatic a/U.f(I)I
pop
iload 0
ireturn
"""

[redirect.f]
handler = "h/H.f(I)I"
static = true
target = "invokestatic a/U.f(I)I"
"#,
    );

    let planned = Plan::load(&path).unwrap().build().unwrap();
    let mut routine = planned.routine;
    assert_eq!(routine.max_locals(), 1);

    let report = planned.pass.run(&mut routine, &mut CollectingSink::new()).unwrap();
    insta::assert_snapshot!(routine.insns().to_string(), @r"
    iconst 9
    istore 0
    iconst 1
    istore 1
    iload 1
    invokestatic h/H.f(I)I
    pop
    iload 0
    ireturn
    ");
    assert_eq!(report.max_locals, 1 + 1 + 2);
}

#[test]
fn test_stack_budget_overflow_aborts_and_rolls_back() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_raw(
        temp_dir.path(),
        "full.toml",
        r#"[routine]
owner = "a/A"
name = "get"
descriptor = "()I"
max_stack = 65535
code = """
getstatic a/A.x:I
ireturn
"""

[redirect.x]
handler = "h/H.x()I"
target = "getstatic a/A.x:I"
"#,
    );

    let planned = Plan::load(&path).unwrap().build().unwrap();
    let mut routine = planned.routine;
    let before = routine.insns().to_string();
    let mut sink = CollectingSink::new();

    let err = planned.pass.run(&mut routine, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        RedirectError::Routine(RoutineError::BudgetOverflow { budget: Budget::Stack, current: 65535, requested: 1 })
    ));
    assert_eq!(sink.fatals.len(), 1);
    assert_eq!(routine.insns().to_string(), before);
    assert_eq!(routine.max_stack(), 65535);
}
