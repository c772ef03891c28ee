//! Route table: navigation intents to URL paths and back
//!
//! Every intent has one template per scope level it exists at. Templates use
//! `:param` segments filled from the [`Scope`] and the intent's own fields.
//! Parameters are only checked for presence.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::scope::{Module, Scope, ScopeLevel};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route '{route}' needs parameter '{param}'")]
    MissingParam {
        route: &'static str,
        param: &'static str,
    },
}

/// Navigation intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Projects,
    ProjectOverview,
    Connectors,
    ConnectorDetails { connector_id: String },
    Secrets,
    Services,
    ServiceDetails { service_id: String },
    Pipelines,
    PipelineStudio { pipeline_id: String },
    PipelineDeployments { pipeline_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteName {
    Home,
    Projects,
    ProjectOverview,
    Connectors,
    ConnectorDetails,
    Secrets,
    Services,
    ServiceDetails,
    Pipelines,
    PipelineStudio,
    PipelineDeployments,
}

/// Templates per intent, shallowest level first
static TABLE: &[(RouteName, ScopeLevel, &str)] = &[
    (RouteName::Home, ScopeLevel::Account, "/account/:accountId/:module/home"),
    (RouteName::Projects, ScopeLevel::Account, "/account/:accountId/projects"),
    (
        RouteName::ProjectOverview,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/dashboard",
    ),
    (
        RouteName::Connectors,
        ScopeLevel::Account,
        "/account/:accountId/settings/resources/connectors",
    ),
    (
        RouteName::Connectors,
        ScopeLevel::Org,
        "/account/:accountId/settings/organizations/:orgIdentifier/setup/resources/connectors",
    ),
    (
        RouteName::Connectors,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/setup/resources/connectors",
    ),
    (
        RouteName::ConnectorDetails,
        ScopeLevel::Account,
        "/account/:accountId/settings/resources/connectors/:connectorId",
    ),
    (
        RouteName::ConnectorDetails,
        ScopeLevel::Org,
        "/account/:accountId/settings/organizations/:orgIdentifier/setup/resources/connectors/:connectorId",
    ),
    (
        RouteName::ConnectorDetails,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/setup/resources/connectors/:connectorId",
    ),
    (
        RouteName::Secrets,
        ScopeLevel::Account,
        "/account/:accountId/settings/resources/secrets",
    ),
    (
        RouteName::Secrets,
        ScopeLevel::Org,
        "/account/:accountId/settings/organizations/:orgIdentifier/setup/resources/secrets",
    ),
    (
        RouteName::Secrets,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/setup/resources/secrets",
    ),
    (
        RouteName::Services,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/services",
    ),
    (
        RouteName::ServiceDetails,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/services/:serviceId",
    ),
    (
        RouteName::Pipelines,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/pipelines",
    ),
    (
        RouteName::PipelineStudio,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/pipelines/:pipelineIdentifier/pipeline-studio",
    ),
    (
        RouteName::PipelineDeployments,
        ScopeLevel::Project,
        "/account/:accountId/:module/orgs/:orgIdentifier/projects/:projectIdentifier/pipelines/:pipelineIdentifier/deployments",
    ),
];

impl Route {
    fn route_name(&self) -> RouteName {
        match self {
            Route::Home => RouteName::Home,
            Route::Projects => RouteName::Projects,
            Route::ProjectOverview => RouteName::ProjectOverview,
            Route::Connectors => RouteName::Connectors,
            Route::ConnectorDetails { .. } => RouteName::ConnectorDetails,
            Route::Secrets => RouteName::Secrets,
            Route::Services => RouteName::Services,
            Route::ServiceDetails { .. } => RouteName::ServiceDetails,
            Route::Pipelines => RouteName::Pipelines,
            Route::PipelineStudio { .. } => RouteName::PipelineStudio,
            Route::PipelineDeployments { .. } => RouteName::PipelineDeployments,
        }
    }

    /// Kebab-case intent name
    pub fn name(&self) -> &'static str {
        match self.route_name() {
            RouteName::Home => "home",
            RouteName::Projects => "projects",
            RouteName::ProjectOverview => "project-overview",
            RouteName::Connectors => "connectors",
            RouteName::ConnectorDetails => "connector-details",
            RouteName::Secrets => "secrets",
            RouteName::Services => "services",
            RouteName::ServiceDetails => "service-details",
            RouteName::Pipelines => "pipelines",
            RouteName::PipelineStudio => "pipeline-studio",
            RouteName::PipelineDeployments => "pipeline-deployments",
        }
    }

    /// Template used at `level`
    ///
    /// Intents that do not exist at `level` fall back to their deepest
    /// template, so missing scope surfaces as a missing parameter.
    pub fn template(&self, level: ScopeLevel) -> &'static str {
        let name = self.route_name();
        let mut fallback = "";
        for (entry, entry_level, template) in TABLE {
            if *entry != name {
                continue;
            }
            if *entry_level == level {
                return *template;
            }
            fallback = *template;
        }
        fallback
    }

    fn resource_id(&self) -> Option<&str> {
        match self {
            Route::ConnectorDetails { connector_id } => Some(connector_id),
            Route::ServiceDetails { service_id } => Some(service_id),
            Route::PipelineStudio { pipeline_id } | Route::PipelineDeployments { pipeline_id } => {
                Some(pipeline_id)
            }
            _ => None,
        }
    }

    fn param(&self, name: &str, scope: &Scope) -> Option<String> {
        let value = match name {
            "accountId" => Some(scope.account_id.clone()),
            "orgIdentifier" => scope.org_identifier.clone(),
            "projectIdentifier" => scope.project_identifier.clone(),
            "module" => scope.module.map(|m| m.slug().to_string()),
            "connectorId" | "serviceId" | "pipelineIdentifier" => {
                self.resource_id().map(str::to_string)
            }
            _ => None,
        };
        value.filter(|v| !v.is_empty())
    }

    /// Concrete path for this intent in `scope`
    pub fn to_path(&self, scope: &Scope) -> Result<String, RouteError> {
        let template = self.template(scope.level());
        let mut path = String::with_capacity(template.len());
        for segment in template.split('/').skip(1) {
            path.push('/');
            match segment.strip_prefix(':') {
                Some(param) => {
                    let value = self.param(param, scope).ok_or(RouteError::MissingParam {
                        route: self.name(),
                        param: static_param(param),
                    })?;
                    path.push_str(&value);
                }
                None => path.push_str(segment),
            }
        }
        Ok(path)
    }

    fn from_params(name: RouteName, params: &BTreeMap<String, String>) -> Option<Route> {
        let id = |key: &str| params.get(key).cloned();
        Some(match name {
            RouteName::Home => Route::Home,
            RouteName::Projects => Route::Projects,
            RouteName::ProjectOverview => Route::ProjectOverview,
            RouteName::Connectors => Route::Connectors,
            RouteName::ConnectorDetails => Route::ConnectorDetails {
                connector_id: id("connectorId")?,
            },
            RouteName::Secrets => Route::Secrets,
            RouteName::Services => Route::Services,
            RouteName::ServiceDetails => Route::ServiceDetails {
                service_id: id("serviceId")?,
            },
            RouteName::Pipelines => Route::Pipelines,
            RouteName::PipelineStudio => Route::PipelineStudio {
                pipeline_id: id("pipelineIdentifier")?,
            },
            RouteName::PipelineDeployments => Route::PipelineDeployments {
                pipeline_id: id("pipelineIdentifier")?,
            },
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource_id() {
            Some(id) => write!(f, "{} ({})", self.name(), id),
            None => f.write_str(self.name()),
        }
    }
}

/// Parameter names as `'static` for error reporting
fn static_param(param: &str) -> &'static str {
    match param {
        "accountId" => "accountId",
        "orgIdentifier" => "orgIdentifier",
        "projectIdentifier" => "projectIdentifier",
        "module" => "module",
        "connectorId" => "connectorId",
        "serviceId" => "serviceId",
        "pipelineIdentifier" => "pipelineIdentifier",
        _ => "unknown",
    }
}

/// Intent and scope recovered from a concrete path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Route,
    pub scope: Scope,
    /// Every `:param` captured from the path
    pub params: BTreeMap<String, String>,
}

/// Match a path against the route table
///
/// Query strings, fragments and trailing slashes are ignored. Returns `None`
/// when no template matches or the `:module` segment is not a known module.
pub fn match_path(path: &str) -> Option<RouteMatch> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path
        .trim_end_matches('/')
        .split('/')
        .skip(1)
        .collect();

    TABLE.iter().find_map(|(name, _, template)| {
        let params = match_template(template, &segments)?;
        let module = match params.get("module") {
            Some(slug) => Some(Module::from_slug(slug)?),
            None => None,
        };
        let scope = Scope {
            account_id: params.get("accountId")?.clone(),
            org_identifier: params.get("orgIdentifier").cloned(),
            project_identifier: params.get("projectIdentifier").cloned(),
            module,
        };
        let route = Route::from_params(*name, &params)?;
        Some(RouteMatch {
            route,
            scope,
            params,
        })
    })
}

fn match_template(template: &str, segments: &[&str]) -> Option<BTreeMap<String, String>> {
    let parts: Vec<&str> = template.split('/').skip(1).collect();
    if parts.len() != segments.len() {
        return None;
    }
    let mut params = BTreeMap::new();
    for (part, segment) in parts.iter().zip(segments) {
        match part.strip_prefix(':') {
            Some(_) if segment.is_empty() => return None,
            Some(param) => {
                params.insert(param.to_string(), (*segment).to_string());
            }
            None if part != segment => return None,
            None => {}
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_scope() -> Scope {
        Scope::project("acc1", "default", "web").with_module(Module::Cd)
    }

    #[test]
    fn test_connectors_path_per_level() {
        assert_eq!(
            Route::Connectors.to_path(&Scope::account("acc1")).unwrap(),
            "/account/acc1/settings/resources/connectors"
        );
        assert_eq!(
            Route::Connectors
                .to_path(&Scope::account("acc1").with_org("default"))
                .unwrap(),
            "/account/acc1/settings/organizations/default/setup/resources/connectors"
        );
        assert_eq!(
            Route::Connectors.to_path(&project_scope()).unwrap(),
            "/account/acc1/cd/orgs/default/projects/web/setup/resources/connectors"
        );
    }

    #[test]
    fn test_pipeline_studio_path() {
        let route = Route::PipelineStudio {
            pipeline_id: "deploy_web".to_string(),
        };
        assert_eq!(
            route.to_path(&project_scope()).unwrap(),
            "/account/acc1/cd/orgs/default/projects/web/pipelines/deploy_web/pipeline-studio"
        );
    }

    #[test]
    fn test_missing_params() {
        assert_eq!(
            Route::Pipelines.to_path(&Scope::account("acc1")).unwrap_err(),
            RouteError::MissingParam {
                route: "pipelines",
                param: "module"
            }
        );
        let no_module = Scope::project("acc1", "default", "web");
        assert!(Route::Services.to_path(&no_module).is_err());

        let route = Route::ServiceDetails {
            service_id: String::new(),
        };
        assert_eq!(
            route.to_path(&project_scope()).unwrap_err(),
            RouteError::MissingParam {
                route: "service-details",
                param: "serviceId"
            }
        );
    }

    #[test]
    fn test_account_only_route_in_project_scope() {
        assert_eq!(
            Route::Projects.to_path(&project_scope()).unwrap(),
            "/account/acc1/projects"
        );
    }

    #[test]
    fn test_match_path_recovers_route_and_scope() {
        let m = match_path("/account/acc1/ci/orgs/default/projects/web/pipelines/build/deployments/")
            .unwrap();
        assert_eq!(
            m.route,
            Route::PipelineDeployments {
                pipeline_id: "build".to_string()
            }
        );
        assert_eq!(
            m.scope,
            Scope::project("acc1", "default", "web").with_module(Module::Ci)
        );
        assert_eq!(m.params.get("pipelineIdentifier").map(String::as_str), Some("build"));
    }

    #[test]
    fn test_match_path_org_connector() {
        let m = match_path(
            "/account/acc1/settings/organizations/default/setup/resources/connectors/docker_hub?tab=history",
        )
        .unwrap();
        assert_eq!(
            m.route,
            Route::ConnectorDetails {
                connector_id: "docker_hub".to_string()
            }
        );
        assert_eq!(m.scope.level(), ScopeLevel::Org);
    }

    #[test]
    fn test_match_path_rejects_unknown() {
        assert!(match_path("/account/acc1/xx/orgs/default/projects/web/pipelines").is_none());
        assert!(match_path("/account//projects").is_none());
        assert!(match_path("/login").is_none());
    }

    #[test]
    fn test_every_template_round_trips() {
        let scope = project_scope();
        let routes = [
            Route::Home,
            Route::Projects,
            Route::ProjectOverview,
            Route::Connectors,
            Route::ConnectorDetails {
                connector_id: "c".to_string(),
            },
            Route::Secrets,
            Route::Services,
            Route::ServiceDetails {
                service_id: "s".to_string(),
            },
            Route::Pipelines,
            Route::PipelineStudio {
                pipeline_id: "p".to_string(),
            },
            Route::PipelineDeployments {
                pipeline_id: "p".to_string(),
            },
        ];
        for route in routes {
            let path = route.to_path(&scope).unwrap();
            assert_eq!(match_path(&path).unwrap().route, route, "{}", path);
        }
    }
}
