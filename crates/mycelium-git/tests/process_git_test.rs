use std::process::Command;

use tempfile::TempDir;

use mycelium_git::{Git, MergeOutcome, ProcessGit};

fn run(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("git must be installed to run mycelium-git tests");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    run(dir.path(), &["init", "-b", "main"]);
    run(dir.path(), &["config", "user.email", "test@example.com"]);
    run(dir.path(), &["config", "user.name", "Test"]);
    std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
    run(dir.path(), &["add", "."]);
    run(dir.path(), &["commit", "-m", "initial"]);
    dir
}

#[test]
fn clone_checkout_and_branch_lifecycle() {
    let source = init_repo();
    let dest = TempDir::new().unwrap();
    let dest_path = dest.path().join("clone");

    let git = ProcessGit::new();
    git.clone_repo(source.path(), &dest_path).unwrap();

    assert_eq!(git.current_branch(&dest_path).unwrap(), "main");
    assert!(!git.branch_exists(&dest_path, "task-001").unwrap());

    git.create_branch(&dest_path, "task-001", "main").unwrap();
    assert!(git.branch_exists(&dest_path, "task-001").unwrap());
    assert_eq!(git.current_branch(&dest_path).unwrap(), "task-001");

    git.checkout(&dest_path, "main").unwrap();
    assert_eq!(git.current_branch(&dest_path).unwrap(), "main");
}

#[test]
fn is_clean_ignores_configured_globs() {
    let repo = init_repo();
    let git = ProcessGit::new();

    assert!(git.is_clean(repo.path(), &[]).unwrap());

    std::fs::create_dir_all(repo.path().join(".task-orchestrator")).unwrap();
    std::fs::write(
        repo.path().join(".task-orchestrator").join("worker-state.json"),
        "{}",
    )
    .unwrap();

    assert!(!git.is_clean(repo.path(), &[]).unwrap());
    assert!(git
        .is_clean(repo.path(), &[".task-orchestrator/**".to_owned()])
        .unwrap());
}

#[test]
fn merge_no_ff_clean_branch_succeeds() {
    let repo = init_repo();
    let git = ProcessGit::new();

    git.create_branch(repo.path(), "feature", "main").unwrap();
    std::fs::write(repo.path().join("feature.txt"), "added\n").unwrap();
    run(repo.path(), &["add", "."]);
    run(repo.path(), &["commit", "-m", "feature work"]);

    git.checkout(repo.path(), "main").unwrap();
    let outcome = git
        .merge_no_ff(repo.path(), "feature", "Merge feature")
        .unwrap();
    match outcome {
        MergeOutcome::Merged(oid) => assert_eq!(oid.len(), 40),
        MergeOutcome::Conflict { .. } => panic!("expected a clean merge"),
    }
    assert!(repo.path().join("feature.txt").exists());
}

#[test]
fn merge_no_ff_conflicting_branch_aborts_and_reports() {
    let repo = init_repo();
    let git = ProcessGit::new();

    git.create_branch(repo.path(), "branch-a", "main").unwrap();
    std::fs::write(repo.path().join("README.md"), "branch a change\n").unwrap();
    run(repo.path(), &["commit", "-am", "branch a"]);

    git.checkout(repo.path(), "main").unwrap();
    git.create_branch(repo.path(), "branch-b", "main").unwrap();
    std::fs::write(repo.path().join("README.md"), "branch b change\n").unwrap();
    run(repo.path(), &["commit", "-am", "branch b"]);

    git.checkout(repo.path(), "main").unwrap();
    git.merge_no_ff(repo.path(), "branch-a", "Merge a").unwrap();

    let outcome = git.merge_no_ff(repo.path(), "branch-b", "Merge b").unwrap();
    match outcome {
        MergeOutcome::Conflict { files, .. } => {
            assert_eq!(files, vec!["README.md".to_owned()]);
        }
        MergeOutcome::Merged(_) => panic!("expected a conflict"),
    }

    // The aborted merge must leave the repo clean, not mid-merge.
    assert!(git.is_clean(repo.path(), &[]).unwrap());
}

#[test]
fn add_info_exclude_is_idempotent() {
    let repo = init_repo();
    let git = ProcessGit::new();

    git.add_info_exclude(repo.path(), ".task-orchestrator/").unwrap();
    git.add_info_exclude(repo.path(), ".task-orchestrator/").unwrap();

    let contents =
        std::fs::read_to_string(repo.path().join(".git/info/exclude")).unwrap();
    assert_eq!(
        contents.matches(".task-orchestrator/").count(),
        1,
        "pattern should only be written once"
    );
}
