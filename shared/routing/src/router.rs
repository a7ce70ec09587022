//! Resolves an alert to an owning team, escalation policy, and initial
//! assignee.

use anyhow::Result;
use beacon_models::alert::AlertMetadata;
use beacon_models::escalation_policy::{EscalationLevel, EscalationTarget, EscalationTargetKind};
use beacon_store::{EscalationLevelRepository, EscalationPolicyRepository, ServiceRepository, TeamMemberRepository, TeamRepository};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::on_call::OnCallResolver;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no team could be resolved for this alert")]
    NoTeam,
    #[error("no active escalation policy with levels is configured")]
    NoPolicy,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub team_id: Uuid,
    pub escalation_policy_id: Uuid,
    pub assigned_user_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

pub struct Router {
    services: ServiceRepository,
    teams: TeamRepository,
    policies: EscalationPolicyRepository,
    levels: EscalationLevelRepository,
    team_members: TeamMemberRepository,
    on_call: OnCallResolver,
}

impl Router {
    pub fn new(
        services: ServiceRepository,
        teams: TeamRepository,
        policies: EscalationPolicyRepository,
        levels: EscalationLevelRepository,
        team_members: TeamMemberRepository,
        on_call: OnCallResolver,
    ) -> Self {
        Self { services, teams, policies, levels, team_members, on_call }
    }

    /// `Route(alert, integrationDefaultServiceId?)`. Tries,
    /// in order: the alert's own `routing_key`, the integration's default
    /// service, then team-tag fallback via `service`/`service_name`.
    pub async fn route(
        &self,
        metadata: &AlertMetadata,
        integration_default_service_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<RouteResult, RouterError> {
        if let Some(routing_key) = &metadata.routing_key {
            if let Some(service) = self.services.find_by_routing_key(routing_key).await? {
                if service.status.is_routable() {
                    return self.route_via_service(service.id, service.team_id, service.escalation_policy_id, at).await;
                }
            }
        }

        if let Some(service_id) = integration_default_service_id {
            if let Some(service) = self.services.find_by_id(service_id).await? {
                if service.status.is_routable() {
                    return self.route_via_service(service.id, service.team_id, service.escalation_policy_id, at).await;
                }
            }
        }

        if let Some(tag) = metadata.service_name.clone() {
            if let Some(team) = self.teams.find_by_tag(&tag).await? {
                let policy_id = team.default_escalation_policy_id.ok_or(RouterError::NoPolicy)?;
                let level = self.first_active_level(policy_id).await?;
                let assigned_user_id = self.resolve_target(&level.parsed_targets(), team.id, at).await?;
                return Ok(RouteResult {
                    team_id: team.id,
                    escalation_policy_id: policy_id,
                    assigned_user_id,
                    service_id: None,
                });
            }
        }

        Err(RouterError::NoTeam)
    }

    async fn route_via_service(
        &self,
        service_id: Uuid,
        team_id: Uuid,
        service_policy_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<RouteResult, RouterError> {
        let policy_id = match service_policy_id {
            Some(id) => id,
            None => {
                let team = self.teams.find_by_id(team_id).await?.ok_or(RouterError::NoPolicy)?;
                team.default_escalation_policy_id.ok_or(RouterError::NoPolicy)?
            }
        };
        let level = self.first_active_level(policy_id).await?;
        let assigned_user_id = self.resolve_target(&level.parsed_targets(), team_id, at).await?;
        Ok(RouteResult { team_id, escalation_policy_id: policy_id, assigned_user_id, service_id: Some(service_id) })
    }

    /// Escalation-policy lookup exposed for the escalation engine, which
    /// needs the policy's `repeat_limit` and `team_id` to drive its own
    /// FSM independently of a fresh alert routing.
    pub async fn policy(&self, policy_id: Uuid) -> Result<Option<beacon_models::escalation_policy::EscalationPolicy>, RouterError> {
        Ok(self.policies.find_by_id(policy_id).await?)
    }

    /// All levels of a policy, sorted by `level_index` ascending.
    pub async fn levels(&self, policy_id: Uuid) -> Result<Vec<EscalationLevel>, RouterError> {
        let mut levels = self.levels.find_for_policy(policy_id).await?;
        levels.sort_by_key(|l| l.level_index);
        Ok(levels)
    }

    /// Re-resolves a level's target at the current instant, so the
    /// escalation engine always pages whoever is on call *now* rather
    /// than whoever was on call when the incident was created.
    pub async fn resolve_level_target(&self, level: &EscalationLevel, team_id: Uuid, at: DateTime<Utc>) -> Result<Option<Uuid>, RouterError> {
        self.resolve_target(&level.parsed_targets(), team_id, at).await
    }

    async fn first_active_level(&self, policy_id: Uuid) -> Result<EscalationLevel, RouterError> {
        let policy = self.policies.find_by_id(policy_id).await?.filter(|p| p.is_active).ok_or(RouterError::NoPolicy)?;
        let mut levels = self.levels.find_for_policy(policy.id).await?;
        levels.sort_by_key(|l| l.level_index);
        levels.into_iter().next().ok_or(RouterError::NoPolicy)
    }

    /// First eligible target across the level's target list (usually
    /// one). A target that fails to resolve (e.g. an inactive user) is
    /// skipped in favor of the next.
    async fn resolve_target(
        &self,
        targets: &[EscalationTarget],
        team_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, RouterError> {
        for target in targets {
            let resolved = match target.kind {
                EscalationTargetKind::User => {
                    let Some(user_id) = target.target_id else { continue };
                    self.team_members.find_by_id(user_id).await?.filter(|m| m.is_active).map(|m| m.id)
                }
                EscalationTargetKind::Schedule => {
                    let Some(schedule_id) = target.target_id else { continue };
                    let Some(on_call) = self.on_call.current_on_call(schedule_id, at).await? else { continue };
                    self.team_members.find_by_id(on_call.user_id).await?.filter(|m| m.is_eligible_oncall()).map(|m| m.id)
                }
                EscalationTargetKind::EntireTeam => {
                    self.team_members.find_eligible_for_team(team_id).await?.into_iter().next().map(|m| m.id)
                }
            };
            if resolved.is_some() {
                return Ok(resolved);
            }
        }
        Ok(None)
    }
}
