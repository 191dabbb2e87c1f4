use actix::Addr;
use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{authorize, AuthorizationLevel};
use crate::balance::{compute_balances, ensure_finite, settle_group};
use crate::error::{AppError, ValidationError};
use crate::exchange::Exchange;
use crate::notify::{Notifier, Notify};
use crate::schemas::{Expense, Group, Member, UserId, TOLERANCE};
use crate::settings;
use crate::settlement::SettlementRecord;
use crate::store::Store;

#[derive(Deserialize, Serialize)]
struct NewGroup {
    name: String,
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Deserialize, Serialize)]
struct MarkPaid {
    to: UserId,
    amount: f64,
}

#[derive(Deserialize, Serialize)]
struct Device {
    token: String,
}

#[derive(Clone, Copy)]
enum Step {
    Confirm,
    Reject,
    Resubmit,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(add_group)
        .service(get_group)
        .service(add_member)
        .service(add_expense)
        .service(get_balance)
        .service(get_settlements)
        .service(get_settlement_records)
        .service(mark_paid)
        .service(confirm_settlement)
        .service(reject_settlement)
        .service(resubmit_settlement)
        .service(register_device);
}

/// Members may only look into their own groups.
fn ensure_access(level: &AuthorizationLevel, group: &Group) -> Result<(), AppError> {
    match level {
        AuthorizationLevel::Service => Ok(()),
        AuthorizationLevel::Member(id) if group.is_member(id) => Ok(()),
        AuthorizationLevel::Member(id) => Err(AppError::Forbidden(format!(
            "\"{id}\" is not a member of \"{}\"",
            group.id
        ))),
    }
}

fn display_name<'a>(group: &'a Group, id: &'a str) -> &'a str {
    group.member(id).map_or(id, |m| m.name.as_str())
}

/// Picks the computed exchange a debtor reports as paid.
///
/// Refuses service callers, pairs that already have an open record, and
/// requests that do not match a computed exchange within [`TOLERANCE`].
fn select_exchange(
    level: &AuthorizationLevel,
    records: &[SettlementRecord],
    exchanges: Vec<Exchange>,
    request: &MarkPaid,
) -> Result<Exchange, AppError> {
    let actor = level.member()?;
    let to = &request.to;
    if records
        .iter()
        .any(|r| r.from == actor && r.to == *to && r.status.is_open())
    {
        return Err(AppError::Conflict(format!(
            "a payment from \"{actor}\" to \"{to}\" is already open"
        )));
    }
    exchanges
        .into_iter()
        .find(|e| {
            e.from == actor && e.to == *to && (e.amount - request.amount).abs() <= TOLERANCE
        })
        .ok_or_else(|| AppError::NotFound(format!("settlement from \"{actor}\" to \"{to}\"")))
}

/// Who hears about a lifecycle step, and what they are told.
fn notice<'a>(
    step: Step,
    record: &'a SettlementRecord,
    group: &Group,
) -> (&'a str, &'static str, String) {
    match step {
        Step::Confirm => (
            record.from.as_str(),
            "Payment confirmed",
            format!(
                "{} confirmed your payment of {:.2}",
                display_name(group, &record.to),
                record.amount
            ),
        ),
        Step::Reject => (
            record.from.as_str(),
            "Payment rejected",
            format!(
                "{} did not receive your payment of {:.2}",
                display_name(group, &record.to),
                record.amount
            ),
        ),
        Step::Resubmit => (
            record.to.as_str(),
            "Payment to confirm",
            format!(
                "{} says they paid you {:.2} in {}",
                display_name(group, &record.from),
                record.amount,
                group.name
            ),
        ),
    }
}

async fn notify_user(
    store: &Store,
    notifier: &Addr<Notifier>,
    user: &str,
    title: &str,
    body: String,
) {
    match store.device_tokens(user).await {
        Ok(tokens) if tokens.is_empty() => tracing::debug!(user = %user, "no devices to notify"),
        Ok(tokens) => notifier.do_send(Notify {
            tokens,
            title: title.to_string(),
            body,
        }),
        Err(err) => tracing::warn!(user = %user, "failed to look up devices: {err}"),
    }
}

#[put("/groups/{id}")]
async fn add_group(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
    json: web::Json<NewGroup>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let NewGroup { name, members } = json.into_inner();
    for (i, member) in members.iter().enumerate() {
        if members[..i].iter().any(|m| m.id == member.id) {
            return Err(ValidationError::DuplicateMember(member.id.clone()).into());
        }
    }
    let group = Group {
        id: id.into_inner(),
        name,
        members,
        expenses: vec![],
    };
    if let AuthorizationLevel::Member(creator) = &level {
        if !group.is_member(creator) {
            return Err(AppError::Forbidden(
                "the creator must be a member of the group".to_string(),
            ));
        }
    }
    store.insert_group(&group).await?;
    tracing::info!(group = %group.id, members = group.members.len(), "group created");
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
async fn get_group(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/groups/{id}/members")]
async fn add_member(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
    member: web::Json<Member>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    let member = member.into_inner();
    store.push_member(&group.id, &member).await?;
    tracing::info!(group = %group.id, member = %member.id, "member added");
    Ok(HttpResponse::Ok().body("Member added"))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
    expense: web::Json<Expense>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    let expense = expense.into_inner();
    expense.validate(&group)?;
    store.push_expense(&group.id, &expense).await?;
    tracing::info!(group = %group.id, amount = expense.amount, "expense added");
    Ok(HttpResponse::Ok().body("Expense added"))
}

#[get("/groups/{id}/balance")]
async fn get_balance(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    let records = store.settlements_for_group(&group.id).await?;
    let balances = compute_balances(&group, &records);
    ensure_finite(&balances)?;
    Ok(HttpResponse::Ok().json(balances))
}

#[get("/groups/{id}/settlements")]
async fn get_settlements(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    let records = store.settlements_for_group(&group.id).await?;
    Ok(HttpResponse::Ok().json(settle_group(&group, &records)?))
}

#[get("/groups/{id}/settlements/records")]
async fn get_settlement_records(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;
    Ok(HttpResponse::Ok().json(store.settlements_for_group(&group.id).await?))
}

#[post("/groups/{id}/settlements")]
async fn mark_paid(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    notifier: web::Data<Addr<Notifier>>,
    id: web::Path<String>,
    json: web::Json<MarkPaid>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let actor = level.member()?;
    let group = store.group(&id).await?;
    ensure_access(&level, &group)?;

    let records = store.settlements_for_group(&group.id).await?;
    let exchanges = settle_group(&group, &records)?;
    let exchange = select_exchange(&level, &records, exchanges, &json)?;

    let record = SettlementRecord::mark_paid(&group.id, &exchange, actor, Utc::now())?;
    store.insert_settlement(&record).await?;
    tracing::info!(settlement = %record.id, group = %group.id, "settlement marked as paid");

    notify_user(
        &store,
        &notifier,
        &record.to,
        "Payment to confirm",
        format!(
            "{} says they paid you {:.2} in {}",
            display_name(&group, &record.from),
            record.amount,
            group.name
        ),
    )
    .await;
    Ok(HttpResponse::Created().json(record))
}

async fn advance(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    notifier: web::Data<Addr<Notifier>>,
    id: web::Path<String>,
    step: Step,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    let actor = level.member()?;
    let mut record = store.settlement(&id).await?;
    let group = store.group(&record.group_id).await?;
    let previous = record.status;
    let now = Utc::now();
    match step {
        Step::Confirm => record.confirm(actor, now)?,
        Step::Reject => record.reject(actor, now)?,
        Step::Resubmit => record.resubmit(actor, now)?,
    }
    store.replace_settlement(&record, previous).await?;
    tracing::info!(settlement = %record.id, from = %previous, to = %record.status, "settlement advanced");

    let (recipient, title, body) = notice(step, &record, &group);
    notify_user(&store, &notifier, recipient, title, body).await;
    Ok(HttpResponse::Ok().json(&record))
}

#[post("/settlements/{id}/confirm")]
async fn confirm_settlement(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    notifier: web::Data<Addr<Notifier>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    advance(req, store, auth, notifier, id, Step::Confirm).await
}

#[post("/settlements/{id}/reject")]
async fn reject_settlement(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    notifier: web::Data<Addr<Notifier>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    advance(req, store, auth, notifier, id, Step::Reject).await
}

#[post("/settlements/{id}/resubmit")]
async fn resubmit_settlement(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    notifier: web::Data<Addr<Notifier>>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    advance(req, store, auth, notifier, id, Step::Resubmit).await
}

#[put("/users/{id}/devices")]
async fn register_device(
    req: HttpRequest,
    store: web::Data<Store>,
    auth: web::Data<settings::Auth>,
    id: web::Path<String>,
    device: web::Json<Device>,
) -> Result<HttpResponse, AppError> {
    let level = authorize(&req, &auth)?;
    if level.member()? != id.as_str() {
        return Err(AppError::Forbidden(
            "devices can only be registered by their owner".to_string(),
        ));
    }
    let token = device.into_inner().token;
    if token.trim().is_empty() {
        return Err(ValidationError::EmptyToken.into());
    }
    store.register_device(&id, &token).await?;
    tracing::info!(user = %id.as_str(), "device registered");
    Ok(HttpResponse::Ok().body("Device registered"))
}
