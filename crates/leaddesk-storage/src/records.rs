//! Backend-independent planning of multi-record changes.
//!
//! Each `plan_*` function takes the rows a transaction has read and returns
//! every row it must write. Backends only have to apply the plan atomically.

use crate::model::{AcceptQuote, NewQuoteVersion};
use crate::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use leaddesk_types::{
    AcceptanceCheck, Activity, ActivityKind, AuditContext, AuditEntityType, AuditLogEntry,
    FieldChange, Lead, LeadStatus, QuoteStatus, QuoteVersion,
};
use serde_json::Value;

pub(crate) struct IntakePlan {
    pub activity: Activity,
    pub audit: AuditLogEntry,
}

pub(crate) fn plan_intake(lead: &Lead, context: &AuditContext) -> IntakePlan {
    let activity = Activity::new(
        lead.id,
        ActivityKind::Intake,
        format!(
            "Lead {} captured via {}: {}",
            lead.reference, lead.source, lead.project.title
        ),
        context.actor.clone(),
        lead.created_at,
    );
    let audit = AuditLogEntry::record(
        AuditEntityType::Lead,
        lead.id,
        "create",
        vec![
            FieldChange::new("status", Value::Null, lead.status.as_str()),
            FieldChange::new("reference", Value::Null, lead.reference.as_str()),
        ],
        context,
        lead.created_at,
    );
    IntakePlan { activity, audit }
}

pub(crate) struct TransitionPlan {
    pub lead: Lead,
    pub from: LeadStatus,
    pub activity: Activity,
    pub audit: AuditLogEntry,
}

pub(crate) fn plan_transition(
    current: &Lead,
    to: LeadStatus,
    context: &AuditContext,
    now: DateTime<Utc>,
) -> StorageResult<TransitionPlan> {
    let from = current.status;
    if from == to {
        return Err(StorageError::InvalidInput(format!(
            "lead {} is already {}",
            current.id, to
        )));
    }
    if from.is_terminal() {
        return Err(StorageError::Conflict(format!(
            "lead {} is closed as {} and cannot move to {}",
            current.id, from, to
        )));
    }

    let mut lead = current.clone();
    lead.status = to;
    lead.updated_at = now;

    let activity = Activity::new(
        lead.id,
        ActivityKind::StatusChange,
        format!("Moved from {} to {}", from, to),
        context.actor.clone(),
        now,
    );
    let audit = AuditLogEntry::record(
        AuditEntityType::Lead,
        lead.id,
        "status_change",
        vec![FieldChange::new("status", from.as_str(), to.as_str())],
        context,
        now,
    );

    Ok(TransitionPlan {
        lead,
        from,
        activity,
        audit,
    })
}

pub(crate) struct QuotePlan {
    pub quote: QuoteVersion,
    pub lead: Lead,
    pub promoted_from: Option<LeadStatus>,
    pub superseded: Vec<QuoteVersion>,
    pub activity: Activity,
    pub audits: Vec<AuditLogEntry>,
}

pub(crate) fn plan_quote(
    lead: &Lead,
    existing: &[QuoteVersion],
    input: NewQuoteVersion,
    context: &AuditContext,
    now: DateTime<Utc>,
) -> StorageResult<QuotePlan> {
    if lead.status.is_terminal() {
        return Err(StorageError::Conflict(format!(
            "lead {} is closed as {}; no new quotes can be issued",
            lead.id, lead.status
        )));
    }

    let version = existing
        .iter()
        .map(|quote| quote.version)
        .max()
        .unwrap_or(0)
        + 1;
    let quote = QuoteVersion::issue(
        lead.id,
        version,
        input.line_items,
        input.currency,
        input.hash_expires_at,
        now,
    )
    .ok_or_else(|| StorageError::InvalidInput("quote total overflows".to_string()))?;

    let mut audits = vec![AuditLogEntry::record(
        AuditEntityType::Quote,
        quote.id,
        "create",
        vec![
            FieldChange::new("version", Value::Null, quote.version),
            FieldChange::new("status", Value::Null, quote.status.as_str()),
            FieldChange::new("total_minor", Value::Null, quote.total_minor),
            FieldChange::new(
                "hash_expires_at",
                Value::Null,
                quote.hash_expires_at.to_rfc3339(),
            ),
        ],
        context,
        now,
    )];

    let mut superseded = Vec::new();
    for previous in existing
        .iter()
        .filter(|q| q.status.is_open())
        .filter(|q| q.accepted_at.is_none())
    {
        let mut retired = previous.clone();
        retired.supersede(now);
        audits.push(AuditLogEntry::record(
            AuditEntityType::Quote,
            retired.id,
            "supersede",
            vec![
                FieldChange::new(
                    "status",
                    previous.status.as_str(),
                    retired.status.as_str(),
                ),
                FieldChange::new(
                    "hash_expires_at",
                    previous.hash_expires_at.to_rfc3339(),
                    retired.hash_expires_at.to_rfc3339(),
                ),
            ],
            context,
            now,
        ));
        superseded.push(retired);
    }

    let mut updated_lead = lead.clone();
    let promoted_from = if lead.status.precedes_quote() {
        updated_lead.status = LeadStatus::Quoted;
        updated_lead.updated_at = now;
        audits.push(AuditLogEntry::record(
            AuditEntityType::Lead,
            lead.id,
            "status_change",
            vec![FieldChange::new(
                "status",
                lead.status.as_str(),
                LeadStatus::Quoted.as_str(),
            )],
            context,
            now,
        ));
        Some(lead.status)
    } else {
        None
    };

    let activity = Activity::new(
        lead.id,
        ActivityKind::QuoteCreated,
        format!(
            "Quote v{} issued for {}, valid until {}",
            quote.version,
            quote.display_total(),
            quote.hash_expires_at.format("%Y-%m-%d")
        ),
        context.actor.clone(),
        now,
    );

    Ok(QuotePlan {
        quote,
        lead: updated_lead,
        promoted_from,
        superseded,
        activity,
        audits,
    })
}

pub(crate) struct AcceptancePlan {
    pub quote: QuoteVersion,
    pub lead: Lead,
    pub previous_lead_status: LeadStatus,
    pub activity: Activity,
    pub quote_audit: AuditLogEntry,
    pub lead_audit: AuditLogEntry,
}

pub(crate) fn plan_acceptance(
    current: &QuoteVersion,
    lead: &Lead,
    command: &AcceptQuote,
) -> StorageResult<AcceptancePlan> {
    let at = command.accepted_at;
    match current.acceptance_check(at) {
        AcceptanceCheck::AlreadyAccepted => {
            return Err(StorageError::Conflict(format!(
                "quote {} has already been accepted",
                current.id
            )))
        }
        AcceptanceCheck::Expired => {
            return Err(StorageError::Expired(format!(
                "acceptance link for quote {} expired at {}",
                current.id,
                current.hash_expires_at.to_rfc3339()
            )))
        }
        AcceptanceCheck::Open => {}
    }
    if lead.status.is_terminal() {
        return Err(StorageError::Conflict(format!(
            "lead {} is closed as {}; quote {} can no longer be accepted",
            lead.id, lead.status, current.id
        )));
    }

    let email = lead.client.email.clone();
    let context = AuditContext::new(format!("client:{}", email))
        .with_ip(command.ip.clone())
        .with_user_agent(command.user_agent.clone());

    let mut quote = current.clone();
    quote.status = QuoteStatus::Accepted;
    quote.accepted_at = Some(at);
    quote.accepted_by_email = Some(email.clone());
    quote.accepted_ip = command.ip.clone();
    quote.accepted_user_agent = command.user_agent.clone();
    quote.acceptance_note = command.note.clone();
    quote.terms_accepted = command.terms_accepted;
    quote.updated_at = at;

    let quote_audit = AuditLogEntry::record(
        AuditEntityType::Quote,
        quote.id,
        "accept",
        vec![
            FieldChange::new("status", current.status.as_str(), quote.status.as_str()),
            FieldChange::new("accepted_at", Value::Null, at.to_rfc3339()),
            FieldChange::new("accepted_by_email", Value::Null, email.as_str()),
            FieldChange::new("accepted_ip", Value::Null, quote.accepted_ip.clone()),
            FieldChange::new(
                "accepted_user_agent",
                Value::Null,
                quote.accepted_user_agent.clone(),
            ),
            FieldChange::new("acceptance_note", Value::Null, quote.acceptance_note.clone()),
            FieldChange::new(
                "terms_accepted",
                current.terms_accepted,
                quote.terms_accepted,
            ),
        ],
        &context,
        at,
    );

    let previous_lead_status = lead.status;
    let mut updated_lead = lead.clone();
    updated_lead.status = LeadStatus::Order;
    updated_lead.updated_at = at;

    let lead_audit = AuditLogEntry::record(
        AuditEntityType::Lead,
        lead.id,
        "quote_accepted",
        vec![FieldChange::new(
            "status",
            previous_lead_status.as_str(),
            LeadStatus::Order.as_str(),
        )],
        &context,
        at,
    );

    let summary = match quote.acceptance_note.as_deref() {
        Some(note) if !note.is_empty() => format!(
            "Quote v{} ({}) accepted by {}. Note: {}",
            quote.version,
            quote.display_total(),
            email,
            note
        ),
        _ => format!(
            "Quote v{} ({}) accepted by {}",
            quote.version,
            quote.display_total(),
            email
        ),
    };
    let activity = Activity::new(
        lead.id,
        ActivityKind::QuoteAccepted,
        summary,
        context.actor.clone(),
        at,
    );

    Ok(AcceptancePlan {
        quote,
        lead: updated_lead,
        previous_lead_status,
        activity,
        quote_audit,
        lead_audit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leaddesk_types::{ClientContact, LineItem, ProjectDetails, QuoteId};

    fn lead(status: LeadStatus) -> Lead {
        let mut lead = Lead::intake(
            ClientContact {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
                company: None,
            },
            ProjectDetails {
                title: "Bridge retrofit".to_string(),
                description: None,
                site_address: None,
                service: "structural".to_string(),
            },
            "referral",
            Utc::now(),
        );
        lead.status = status;
        lead
    }

    fn new_quote(lead: &Lead) -> NewQuoteVersion {
        NewQuoteVersion {
            lead_id: lead.id,
            line_items: vec![LineItem {
                description: "Inspection".to_string(),
                quantity: 2,
                unit_price_minor: 50_000,
            }],
            currency: "EUR".to_string(),
            hash_expires_at: Utc::now() + Duration::days(30),
        }
    }

    fn accept(quote_id: QuoteId) -> AcceptQuote {
        AcceptQuote {
            quote_id,
            accepted_at: Utc::now(),
            ip: Some("198.51.100.4".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            note: Some("Start in May please".to_string()),
            terms_accepted: true,
        }
    }

    #[test]
    fn transition_rejects_same_status() {
        let lead = lead(LeadStatus::Contacted);
        let result = plan_transition(
            &lead,
            LeadStatus::Contacted,
            &AuditContext::new("staff"),
            Utc::now(),
        );
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn transition_rejects_leaving_terminal_status() {
        let lead = lead(LeadStatus::Lost);
        let result = plan_transition(
            &lead,
            LeadStatus::New,
            &AuditContext::new("staff"),
            Utc::now(),
        );
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn quote_plan_numbers_versions_and_supersedes() {
        let lead = lead(LeadStatus::Qualified);
        let context = AuditContext::new("staff");
        let first = plan_quote(&lead, &[], new_quote(&lead), &context, Utc::now()).unwrap();
        assert_eq!(first.quote.version, 1);
        assert_eq!(first.promoted_from, Some(LeadStatus::Qualified));
        assert_eq!(first.lead.status, LeadStatus::Quoted);
        assert!(first.superseded.is_empty());

        let second = plan_quote(
            &first.lead,
            &[first.quote.clone()],
            new_quote(&lead),
            &context,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(second.quote.version, 2);
        assert_eq!(second.promoted_from, None);
        assert_eq!(second.superseded.len(), 1);
        assert_eq!(second.superseded[0].status, QuoteStatus::Superseded);
        // create + supersede
        assert_eq!(second.audits.len(), 2);
    }

    #[test]
    fn quote_plan_rejects_closed_lead() {
        let lead = lead(LeadStatus::Order);
        let result = plan_quote(
            &lead,
            &[],
            new_quote(&lead),
            &AuditContext::new("staff"),
            Utc::now(),
        );
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[test]
    fn acceptance_plan_fills_metadata_and_two_audits() {
        let lead = lead(LeadStatus::Quoted);
        let plan = plan_quote(
            &lead,
            &[],
            new_quote(&lead),
            &AuditContext::new("staff"),
            Utc::now(),
        )
        .unwrap();
        let command = accept(plan.quote.id);
        let accepted = plan_acceptance(&plan.quote, &plan.lead, &command).unwrap();

        assert_eq!(accepted.quote.status, QuoteStatus::Accepted);
        assert_eq!(accepted.quote.accepted_at, Some(command.accepted_at));
        assert_eq!(
            accepted.quote.accepted_by_email.as_deref(),
            Some("ada@example.com")
        );
        assert!(accepted.quote.terms_accepted);
        assert_eq!(accepted.lead.status, LeadStatus::Order);
        assert_eq!(accepted.previous_lead_status, LeadStatus::Quoted);
        assert_eq!(accepted.quote_audit.entity_type, AuditEntityType::Quote);
        assert_eq!(accepted.lead_audit.entity_type, AuditEntityType::Lead);
        assert_eq!(
            accepted.lead_audit.change("status").unwrap().new,
            Value::from("order")
        );
        assert_eq!(accepted.quote_audit.ip.as_deref(), Some("198.51.100.4"));
        assert!(accepted.activity.summary.contains("Start in May please"));
    }

    #[test]
    fn acceptance_plan_rejects_accepted_and_expired() {
        let lead = lead(LeadStatus::Quoted);
        let plan = plan_quote(
            &lead,
            &[],
            new_quote(&lead),
            &AuditContext::new("staff"),
            Utc::now(),
        )
        .unwrap();

        let mut accepted = plan.quote.clone();
        accepted.accepted_at = Some(Utc::now());
        assert!(matches!(
            plan_acceptance(&accepted, &plan.lead, &accept(accepted.id)),
            Err(StorageError::Conflict(_))
        ));

        let mut expired = plan.quote.clone();
        expired.hash_expires_at = Utc::now() - Duration::minutes(1);
        assert!(matches!(
            plan_acceptance(&expired, &plan.lead, &accept(expired.id)),
            Err(StorageError::Expired(_))
        ));
    }

    #[test]
    fn acceptance_plan_rejects_closed_lead() {
        let lead = lead(LeadStatus::Quoted);
        let plan = plan_quote(
            &lead,
            &[],
            new_quote(&lead),
            &AuditContext::new("staff"),
            Utc::now(),
        )
        .unwrap();

        for closed in [LeadStatus::Lost, LeadStatus::Order] {
            let mut closed_lead = plan.lead.clone();
            closed_lead.status = closed;
            assert!(matches!(
                plan_acceptance(&plan.quote, &closed_lead, &accept(plan.quote.id)),
                Err(StorageError::Conflict(_))
            ));
        }
    }
}
