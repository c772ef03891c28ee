//! Account / org / project scope shared by routes, payloads and API calls

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Product modules that own a route prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    /// Continuous delivery
    Cd,
    /// Continuous integration
    Ci,
    /// Feature flags
    Cf,
    /// Cloud cost management
    Ce,
    /// Continuous verification
    Cv,
}

impl Module {
    pub fn all() -> &'static [Module] {
        &[Module::Cd, Module::Ci, Module::Cf, Module::Ce, Module::Cv]
    }

    /// Path segment used in routes
    pub fn slug(&self) -> &'static str {
        match self {
            Module::Cd => "cd",
            Module::Ci => "ci",
            Module::Cf => "cf",
            Module::Ce => "ce",
            Module::Cv => "cv",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Module::Cd => "Continuous Delivery",
            Module::Ci => "Continuous Integration",
            Module::Cf => "Feature Flags",
            Module::Ce => "Cloud Costs",
            Module::Cv => "Continuous Verification",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Module> {
        Module::all().iter().copied().find(|m| m.slug() == slug)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::from_slug(&s.to_lowercase()).ok_or_else(|| format!("unknown module '{}'", s))
    }
}

/// Level an entity or page lives at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeLevel {
    Account,
    Org,
    Project,
}

/// Scope a wizard or navigation intent is evaluated in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<Module>,
}

impl Scope {
    /// Account-level scope
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Project-level scope
    pub fn project(
        account_id: impl Into<String>,
        org_identifier: impl Into<String>,
        project_identifier: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            org_identifier: Some(org_identifier.into()),
            project_identifier: Some(project_identifier.into()),
            module: None,
        }
    }

    pub fn with_org(mut self, org_identifier: impl Into<String>) -> Self {
        self.org_identifier = Some(org_identifier.into());
        self
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.module = Some(module);
        self
    }

    /// Deepest level the scope reaches
    ///
    /// A project identifier without an org is treated as org-less account scope.
    pub fn level(&self) -> ScopeLevel {
        match (&self.org_identifier, &self.project_identifier) {
            (Some(_), Some(_)) => ScopeLevel::Project,
            (Some(_), None) => ScopeLevel::Org,
            _ => ScopeLevel::Account,
        }
    }

    /// Query parameters the NG API expects on scoped requests
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("accountIdentifier", self.account_id.clone())];
        if let Some(org) = &self.org_identifier {
            params.push(("orgIdentifier", org.clone()));
            if let Some(project) = &self.project_identifier {
                params.push(("projectIdentifier", project.clone()));
            }
        }
        params
    }
}
