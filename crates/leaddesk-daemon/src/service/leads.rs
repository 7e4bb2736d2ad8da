//! Lead intake, pipeline moves and timeline notes

use crate::api::rest::state::AppState;
use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult};
use crate::validation::{check_email, limit_text, require_text, Validate};
use chrono::{DateTime, Utc};
use leaddesk_storage::{LeadFilter, LeadTransition, QueryWindow};
use leaddesk_types::{
    Activity, ActivityKind, ClientContact, Lead, LeadDeskEvent, LeadId, LeadStatus,
    ProjectDetails,
};
use serde::{Deserialize, Serialize};

pub const MAX_NOTE_CHARS: usize = 2000;

/// Body of `POST /leads`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadRequest {
    pub client: ClientContact,
    pub project: ProjectDetails,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "website".to_string()
}

impl Validate for CreateLeadRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("client.name", &self.client.name, 200)?;
        check_email("client.email", self.client.email.trim())?;
        if let Some(phone) = &self.client.phone {
            limit_text("client.phone", phone, 50)?;
        }
        if let Some(company) = &self.client.company {
            limit_text("client.company", company, 200)?;
        }
        require_text("project.title", &self.project.title, 200)?;
        if let Some(description) = &self.project.description {
            limit_text("project.description", description, 5000)?;
        }
        if let Some(address) = &self.project.site_address {
            limit_text("project.site_address", address, 500)?;
        }
        limit_text("project.service", &self.project.service, 100)?;
        require_text("source", &self.source, 50)
    }
}

impl CreateLeadRequest {
    /// Normalize the captured fields into a new lead
    pub fn into_lead(self, now: DateTime<Utc>) -> Lead {
        let client = ClientContact {
            name: self.client.name.trim().to_string(),
            email: self.client.email.trim().to_ascii_lowercase(),
            phone: trimmed(self.client.phone),
            company: trimmed(self.client.company),
        };
        let project = ProjectDetails {
            title: self.project.title.trim().to_string(),
            description: trimmed(self.project.description),
            site_address: trimmed(self.project.site_address),
            service: self.project.service.trim().to_string(),
        };
        Lead::intake(client, project, self.source.trim().to_ascii_lowercase(), now)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Body of `POST /leads/:id/status`
#[derive(Debug, Clone, Deserialize)]
pub struct MoveLeadRequest {
    pub status: String,
}

impl Validate for MoveLeadRequest {
    fn validate(&self) -> Result<(), String> {
        self.target().map(|_| ())
    }
}

impl MoveLeadRequest {
    pub fn target(&self) -> Result<LeadStatus, String> {
        self.status.parse().map_err(|e| format!("{}", e))
    }
}

/// Body of `POST /leads/:id/activities`
#[derive(Debug, Clone, Deserialize)]
pub struct AddNoteRequest {
    pub note: String,
}

impl Validate for AddNoteRequest {
    fn validate(&self) -> Result<(), String> {
        require_text("note", &self.note, MAX_NOTE_CHARS)
    }
}

/// One column of the pipeline board
#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    pub status: LeadStatus,
    pub count: usize,
    pub leads: Vec<LeadCard>,
}

/// Compact lead shown on the board
#[derive(Debug, Clone, Serialize)]
pub struct LeadCard {
    pub id: LeadId,
    pub reference: String,
    pub client_name: String,
    pub company: Option<String>,
    pub project_title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&Lead> for LeadCard {
    fn from(lead: &Lead) -> Self {
        Self {
            id: lead.id,
            reference: lead.reference.clone(),
            client_name: lead.client.name.clone(),
            company: lead.client.company.clone(),
            project_title: lead.project.title.clone(),
            updated_at: lead.updated_at,
        }
    }
}

pub async fn create_lead(
    state: &AppState,
    request: CreateLeadRequest,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> ApiResult<Lead> {
    let lead = request.into_lead(now);
    let lead = state
        .storage
        .create_lead(lead, &context.audit_context())
        .await?;

    tracing::info!(lead_id = %lead.id, reference = %lead.reference, source = %lead.source, "Lead created");
    state.publish(
        LeadDeskEvent::LeadCreated {
            lead_id: lead.id,
            reference: lead.reference.clone(),
        },
        &context.actor,
    );
    Ok(lead)
}

pub async fn get_lead(state: &AppState, id: &LeadId) -> ApiResult<Lead> {
    state
        .storage
        .get_lead(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Lead {} not found", id)))
}

pub async fn list_leads(
    state: &AppState,
    status: Option<&str>,
    window: QueryWindow,
) -> ApiResult<Vec<Lead>> {
    let status = status
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(state.storage.list_leads(LeadFilter { status, window }).await?)
}

pub async fn move_lead(
    state: &AppState,
    id: &LeadId,
    request: MoveLeadRequest,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> ApiResult<LeadTransition> {
    let to = request.target().map_err(ApiError::Validation)?;
    let transition = state
        .storage
        .transition_lead(id, to, &context.audit_context(), now)
        .await?;

    tracing::info!(lead_id = %id, from = %transition.from, to = %to, actor = %context.actor, "Lead moved");
    state.publish(
        LeadDeskEvent::LeadStatusChanged {
            lead_id: *id,
            from: transition.from,
            to,
        },
        &context.actor,
    );
    Ok(transition)
}

pub async fn add_note(
    state: &AppState,
    id: &LeadId,
    request: AddNoteRequest,
    context: &RequestContext,
    now: DateTime<Utc>,
) -> ApiResult<Activity> {
    let activity = Activity::new(
        *id,
        ActivityKind::Note,
        request.note.trim(),
        context.actor.clone(),
        now,
    );
    Ok(state.storage.append_activity(activity).await?)
}

pub async fn list_activities(
    state: &AppState,
    id: &LeadId,
    window: QueryWindow,
) -> ApiResult<Vec<Activity>> {
    get_lead(state, id).await?;
    Ok(state.storage.list_activities(id, window).await?)
}

/// Leads grouped into board columns, in pipeline order
pub async fn board(state: &AppState) -> ApiResult<Vec<BoardColumn>> {
    let leads = state.storage.list_leads(LeadFilter::default()).await?;
    Ok(group_into_columns(&leads))
}

pub fn group_into_columns(leads: &[Lead]) -> Vec<BoardColumn> {
    LeadStatus::PIPELINE
        .iter()
        .map(|status| {
            let cards: Vec<LeadCard> = leads
                .iter()
                .filter(|lead| lead.status == *status)
                .map(LeadCard::from)
                .collect();
            BoardColumn {
                status: *status,
                count: cards.len(),
                leads: cards,
            }
        })
        .collect()
}
