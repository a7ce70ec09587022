//! Team and team-member storage.

use anyhow::{Context, Result};
use beacon_models::team::{NotificationChannelKind, Team, TeamMember};
use sqlx::PgPool;
use uuid::Uuid;

pub struct TeamRepository {
    pool: PgPool,
}

impl TeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Team>> {
        let row: Option<Team> = sqlx::query_as("SELECT * FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find team by id")?;
        Ok(row)
    }

    pub async fn create(&self, team: &Team) -> Result<()> {
        sqlx::query("INSERT INTO teams (id, name, tag, default_escalation_policy_id, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(team.id)
            .bind(&team.name)
            .bind(&team.tag)
            .bind(team.default_escalation_policy_id)
            .bind(team.created_at)
            .execute(&self.pool)
            .await
            .context("insert team")?;
        Ok(())
    }

    pub async fn find_by_tag(&self, tag: &str) -> Result<Option<Team>> {
        let row: Option<Team> = sqlx::query_as("SELECT * FROM teams WHERE tag = $1")
            .bind(tag)
            .fetch_optional(&self.pool)
            .await
            .context("find team by tag")?;
        Ok(row)
    }
}

pub struct TeamMemberRepository {
    pool: PgPool,
}

impl TeamMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<TeamMember>> {
        let row: Option<TeamMember> = sqlx::query_as("SELECT * FROM team_members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("find team member by id")?;
        Ok(row)
    }

    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<TeamMember>> {
        let rows: Vec<TeamMember> = sqlx::query_as("SELECT * FROM team_members WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("find team members by ids")?;
        Ok(rows)
    }

    pub async fn create(&self, member: &TeamMember) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO team_members (id, team_id, name, email, phone, contact_methods, timezone, role, is_active, joined_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
        .bind(member.id)
        .bind(member.team_id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(&member.contact_methods)
        .bind(&member.timezone)
        .bind(member.role.to_string())
        .bind(member.is_active)
        .bind(member.joined_at)
        .execute(&self.pool)
        .await
        .context("insert team member")?;
        Ok(())
    }

    /// All active, on-call-eligible members of a team, ordered by
    /// earliest-joined first.
    pub async fn find_eligible_for_team(&self, team_id: Uuid) -> Result<Vec<TeamMember>> {
        let rows: Vec<TeamMember> = sqlx::query_as(
            r#"
            SELECT * FROM team_members
            WHERE team_id = $1 AND is_active = TRUE AND role IN ('RESPONDER', 'TEAM_ADMIN')
            ORDER BY joined_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .context("find eligible team members")?;
        Ok(rows)
    }

    /// Finds the active member who owns `address` as a contact method of
    /// `kind` — how an inbound provider webhook's sender (phone number,
    /// Slack user id) is translated back to the member who must own the
    /// reply before it is allowed to acknowledge/resolve anything. No indexed lookup exists for a JSON contact
    /// list, so this scans active members; the table is small enough
    /// (per-team roster) that this is not a hot path.
    pub async fn find_by_contact_address(&self, kind: NotificationChannelKind, address: &str) -> Result<Option<TeamMember>> {
        let rows: Vec<TeamMember> = sqlx::query_as("SELECT * FROM team_members WHERE is_active = TRUE")
            .fetch_all(&self.pool)
            .await
            .context("scan active team members for contact address")?;
        Ok(rows.into_iter().find(|member| member.contacts_for(kind).iter().any(|c| c.address == address)))
    }
}
