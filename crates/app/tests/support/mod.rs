//! git2 fixtures shared by the integration tests

#![allow(dead_code)]

use anyhow::{Context, Result};
use git2::{Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BASE_TIME: i64 = 1_700_000_000;

pub fn signature(seconds: i64) -> Result<Signature<'static>> {
    Ok(Signature::new(
        "Test User",
        "test@example.com",
        &Time::new(seconds, 0),
    )?)
}

pub fn init_repo(path: &Path) -> Result<Repository> {
    fs::create_dir_all(path)?;
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    Ok(Repository::init_opts(path, &opts)?)
}

/// Write `file`, stage it and commit on HEAD
pub fn commit_file(
    git_repo: &Repository,
    file: &str,
    content: &str,
    message: &str,
    seconds: i64,
) -> Result<Oid> {
    let workdir = git_repo.workdir().context("repository has no workdir")?;
    fs::write(workdir.join(file), content)?;

    let mut index = git_repo.index()?;
    index.add_path(Path::new(file))?;
    index.write()?;
    let tree = git_repo.find_tree(index.write_tree()?)?;

    let sig = signature(seconds)?;
    let parents = match git_repo.head() {
        Ok(head) => vec![head.peel_to_commit()?],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

    Ok(git_repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?)
}

/// A "remote" repository with three commits on `main`:
/// `first` tagged `v1.0` (lightweight) and carrying branch `feature`,
/// `second` tagged `v2.0` (annotated), `third` untagged.
pub struct Remote {
    pub temp: TempDir,
    pub path: PathBuf,
    pub repo: Repository,
    pub first: Oid,
    pub second: Oid,
    pub third: Oid,
}

impl Remote {
    pub fn create() -> Result<Self> {
        let temp = TempDir::new()?;
        let path = temp.path().join("remote");
        let repo = init_repo(&path)?;

        let first = commit_file(&repo, "a.txt", "one\n", "first", BASE_TIME)?;
        let second = commit_file(&repo, "b.txt", "two\n", "second", BASE_TIME + 60)?;
        let third = commit_file(&repo, "c.txt", "three\n", "third", BASE_TIME + 120)?;

        repo.tag_lightweight("v1.0", &repo.find_object(first, None)?, false)?;
        repo.tag(
            "v2.0",
            &repo.find_object(second, None)?,
            &signature(BASE_TIME + 60)?,
            "release 2.0",
            false,
        )?;
        repo.branch("feature", &repo.find_commit(first)?, false)?;

        Ok(Self {
            temp,
            path,
            repo,
            first,
            second,
            third,
        })
    }

    pub fn url(&self) -> Result<String> {
        Ok(self.path.to_str().context("non UTF-8 temp path")?.to_string())
    }

    /// Add a commit on `main`
    pub fn advance(&self, file: &str, message: &str, seconds: i64) -> Result<Oid> {
        commit_file(&self.repo, file, message, message, seconds)
    }
}
