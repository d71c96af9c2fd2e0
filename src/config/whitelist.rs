use std::collections::{BTreeMap, HashMap};

use crate::error::{BotError, Result};
use crate::models::MemberInfo;

/// Project name -> claim URL for everything one member may claim
pub type Claimable = BTreeMap<String, String>;

/// Every loaded claim campaign, keyed by project name.
/// Each project maps a user identifier (numeric ID or name#tag) to a claim URL.
#[derive(Debug, Clone, Default)]
pub struct Whitelists {
    projects: BTreeMap<String, HashMap<String, String>>,
}

impl Whitelists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every project file eagerly; any missing or malformed file is fatal
    pub fn load(paths: &BTreeMap<String, String>) -> Result<Self> {
        let mut whitelists = Self::new();
        for (project, path) in paths {
            let content =
                std::fs::read_to_string(path).map_err(|e| BotError::WhitelistLoad {
                    project: project.clone(),
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            let entries: HashMap<String, String> =
                serde_json::from_str(&content).map_err(|e| BotError::WhitelistLoad {
                    project: project.clone(),
                    path: path.clone(),
                    message: e.to_string(),
                })?;

            tracing::info!(
                "Loaded whitelist '{}' with {} entries from {}",
                project,
                entries.len(),
                path
            );
            whitelists.insert(project, entries);
        }
        Ok(whitelists)
    }

    pub fn insert(&mut self, project: &str, entries: HashMap<String, String>) {
        self.projects.insert(project.to_string(), entries);
    }

    /// Claim URL for a member in one project, by numeric ID first, then by tag
    fn url_for<'a>(entries: &'a HashMap<String, String>, member: &MemberInfo) -> Option<&'a String> {
        entries
            .get(&member.id.to_string())
            .or_else(|| entries.get(&member.tag()))
            .filter(|url| !url.is_empty())
    }

    /// Every project the member is whitelisted in, with its URL
    pub fn claimable_for(&self, member: &MemberInfo) -> Claimable {
        self.projects
            .iter()
            .filter_map(|(project, entries)| {
                Self::url_for(entries, member).map(|url| (project.clone(), url.clone()))
            })
            .collect()
    }

    /// Members of `members` that appear in the given project
    pub fn members_in<'a>(&self, project: &str, members: &'a [MemberInfo]) -> Vec<&'a MemberInfo> {
        match self.projects.get(project) {
            Some(entries) => members
                .iter()
                .filter(|m| Self::url_for(entries, m).is_some())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn project_names(&self) -> Vec<&String> {
        self.projects.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }
}
