use std::process::Command;

#[test]
fn test_missing_custom_root_is_rejected_without_creating_it() {
    let parent = tempfile::tempdir().expect("Failed to create temp dir");
    let root = parent.path().join("typo").join("a").join("b");

    let output = Command::new(env!("CARGO_BIN_EXE_govm"))
        .arg("update")
        .arg("--custom-path")
        .arg(&root)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid or not writable"), "stderr: {stderr}");
    assert!(!parent.path().join("typo").exists());
}
