use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use agora_audit::{AuditEntry, AuditLog};
use agora_dispute::CaseSummary;
use agora_registry::{RegistryConfig, Settlement};
use agora_stake::{StakeAccount, Token};
use agora_types::{
    AgoraError, ErrorClass, Hash32, IdentityClaim, Job, JobId, JobState, ReputationRegistry, Role, ValidationOutcome,
    ZERO_HASH,
};
use agora_validation::{Ballot, RoundSummary};

use crate::state::{AppState, Arbitration};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(create_job).get(list_jobs))
        .route("/api/v1/jobs/{job_id}", get(get_job))
        .route("/api/v1/jobs/{job_id}/apply", post(apply_for_job))
        .route("/api/v1/jobs/{job_id}/submit", post(submit))
        .route("/api/v1/jobs/{job_id}/burn-receipt", post(submit_burn_receipt))
        .route("/api/v1/jobs/{job_id}/burn-confirm", post(confirm_burn))
        .route("/api/v1/jobs/{job_id}/validation", get(get_round))
        .route("/api/v1/jobs/{job_id}/validation/commit", post(commit_validation))
        .route("/api/v1/jobs/{job_id}/validation/reveal", post(reveal_validation))
        .route("/api/v1/jobs/{job_id}/validation/finalize", post(finalize_validation))
        .route("/api/v1/jobs/{job_id}/validation/force", post(force_finalize_validation))
        .route("/api/v1/jobs/{job_id}/validation/restart", post(restart_validation))
        .route("/api/v1/jobs/{job_id}/dispute", post(raise_dispute).get(get_dispute))
        .route("/api/v1/jobs/{job_id}/dispute/commit", post(commit_dispute))
        .route("/api/v1/jobs/{job_id}/dispute/reveal", post(reveal_dispute))
        .route("/api/v1/jobs/{job_id}/dispute/ruling", post(deliver_ruling))
        .route("/api/v1/jobs/{job_id}/dispute/resolve", post(resolve_dispute))
        .route("/api/v1/jobs/{job_id}/dispute/override", post(governance_resolve))
        .route("/api/v1/jobs/{job_id}/finalize", post(finalize))
        .route("/api/v1/jobs/{job_id}/cancel", post(cancel_job))
        .route("/api/v1/jobs/{job_id}/delist", post(delist_job))
        .route("/api/v1/jobs/{job_id}/expire", post(expire_job))
        .route("/api/v1/jobs/{job_id}/audit", get(job_audit))
        .route("/api/v1/stake/deposit", post(deposit))
        .route("/api/v1/stake/withdraw", post(withdraw))
        .route("/api/v1/stake/unbond", post(request_withdraw))
        .route("/api/v1/stake/unbond/finalize", post(finalize_withdraw))
        .route("/api/v1/stake/{holder}", get(get_stake))
        .route("/api/v1/token/mint", post(mint))
        .route("/api/v1/token/{holder}", get(get_balance))
        .route("/api/v1/policy", get(get_policy))
        .route("/api/v1/policy/acknowledge", post(acknowledge_policy))
        .route("/api/v1/beacon/commit", post(beacon_commit))
        .route("/api/v1/beacon/reveal", post(beacon_reveal))
        .route("/api/v1/beacon/forfeit", post(beacon_forfeit))
        .route("/api/v1/governance/registry-config", put(set_registry_config))
        .route("/api/v1/governance/validators", post(add_validator))
        .route("/api/v1/governance/blacklist", post(set_blacklisted))
        .route("/api/v1/audit", get(list_audit))
        .route("/api/v1/audit/verify", get(verify_audit))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ---- errors ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub class: String,
}

#[derive(Debug)]
pub enum ApiError {
    Market(AgoraError),
    BadRequest(String),
    NotConfigured(&'static str),
}

impl From<AgoraError> for ApiError {
    fn from(err: AgoraError) -> Self {
        ApiError::Market(err)
    }
}

pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Authorization => StatusCode::FORBIDDEN,
        ErrorClass::State => StatusCode::CONFLICT,
        ErrorClass::Economic => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, class, error) = match self {
            ApiError::Market(err) => {
                let class = err.class();
                if class == ErrorClass::Internal {
                    tracing::error!(error = %err, "request failed");
                }
                (status_for(class), format!("{class:?}").to_lowercase(), err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "request".to_string(), msg),
            ApiError::NotConfigured(what) => (
                StatusCode::NOT_FOUND,
                "notfound".to_string(),
                format!("{what} is not configured on this node"),
            ),
        };
        (status, Json(ErrorResponse { error, class })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Audit whatever the call emitted, then surface its result.
async fn audited<T>(state: &AppState, result: agora_types::Result<T>) -> Result<T, ApiError> {
    state.flush_events().await?;
    Ok(result?)
}

fn parse_hash(field: &str, value: &str) -> Result<Hash32, ApiError> {
    let mut out = ZERO_HASH;
    hex::decode_to_slice(value.trim_start_matches("0x"), &mut out)
        .map_err(|e| ApiError::BadRequest(format!("{field}: {e}")))?;
    Ok(out)
}

fn parse_optional_hash(field: &str, value: Option<&str>) -> Result<Hash32, ApiError> {
    value.map_or(Ok(ZERO_HASH), |v| parse_hash(field, v))
}

fn ensure_governance(state: &AppState, caller: Uuid) -> Result<(), ApiError> {
    if caller != state.governance() {
        return Err(AgoraError::Unauthorized("governance".into()).into());
    }
    Ok(())
}

// ---- jobs ------------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateJobRequest {
    employer: Uuid,
    reward: u64,
    deadline: u64,
    spec_hash: String,
    #[serde(default)]
    uri: String,
}

#[derive(Serialize, Deserialize)]
pub struct CreatedJob {
    pub job_id: JobId,
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreatedJob>), ApiError> {
    let spec_hash = parse_hash("spec_hash", &req.spec_hash)?;
    let result = state
        .registry
        .create_job(req.employer, req.reward, req.deadline, spec_hash, req.uri);
    let job_id = audited(&state, result).await?;
    Ok((StatusCode::CREATED, Json(CreatedJob { job_id })))
}

#[derive(Deserialize)]
struct JobFilter {
    state: Option<JobState>,
}

async fn list_jobs(State(state): State<AppState>, Query(filter): Query<JobFilter>) -> Json<Vec<Job>> {
    let jobs = match filter.state {
        Some(job_state) => state.registry.jobs_in_state(job_state),
        None => state.registry.jobs(),
    };
    Json(jobs)
}

async fn get_job(State(state): State<AppState>, Path(job_id): Path<JobId>) -> ApiResult<Job> {
    Ok(Json(state.registry.job(job_id)?))
}

#[derive(Deserialize)]
struct ApplyRequest {
    agent: Uuid,
    #[serde(default)]
    claim: IdentityClaim,
    /// Acknowledge the current tax policy in the same call.
    #[serde(default)]
    acknowledge: bool,
}

async fn apply_for_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<Job> {
    let result = if req.acknowledge {
        state.registry.acknowledge_and_apply(req.agent, job_id, &req.claim)
    } else {
        state.registry.apply_for_job(req.agent, job_id, &req.claim)
    };
    audited(&state, result).await?;
    Ok(Json(state.registry.job(job_id)?))
}

#[derive(Deserialize)]
struct SubmitRequest {
    agent: Uuid,
    result_hash: String,
    #[serde(default)]
    result_uri: String,
}

async fn submit(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Job> {
    let result_hash = parse_hash("result_hash", &req.result_hash)?;
    let result = state.registry.submit(req.agent, job_id, result_hash, req.result_uri);
    audited(&state, result).await?;
    Ok(Json(state.registry.job(job_id)?))
}

#[derive(Deserialize)]
struct BurnReceiptRequest {
    employer: Uuid,
    burn_tx: String,
    amount: u64,
    #[serde(default)]
    block: u64,
}

async fn submit_burn_receipt(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<BurnReceiptRequest>,
) -> ApiResult<Job> {
    let burn_tx = parse_hash("burn_tx", &req.burn_tx)?;
    let result = state
        .registry
        .submit_burn_receipt(req.employer, job_id, burn_tx, req.amount, req.block);
    audited(&state, result).await?;
    Ok(Json(state.registry.job(job_id)?))
}

#[derive(Deserialize)]
struct BurnConfirmRequest {
    employer: Uuid,
    burn_tx: String,
}

async fn confirm_burn(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<BurnConfirmRequest>,
) -> ApiResult<Job> {
    let burn_tx = parse_hash("burn_tx", &req.burn_tx)?;
    let result = state.registry.confirm_employer_burn(req.employer, job_id, burn_tx);
    audited(&state, result).await?;
    Ok(Json(state.registry.job(job_id)?))
}

// ---- validation ------------------------------------------------------------------------

async fn get_round(State(state): State<AppState>, Path(job_id): Path<JobId>) -> ApiResult<RoundSummary> {
    state
        .registry
        .validation_round(job_id)
        .map(Json)
        .ok_or_else(|| AgoraError::RoundNotFound(job_id).into())
}

#[derive(Deserialize)]
struct CommitRequest {
    validator: Uuid,
    commitment: String,
    #[serde(default)]
    claim: IdentityClaim,
}

async fn commit_validation(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CommitRequest>,
) -> ApiResult<RoundSummary> {
    let commitment = parse_hash("commitment", &req.commitment)?;
    let result = state
        .registry
        .commit_validation(req.validator, job_id, commitment, &req.claim);
    audited(&state, result).await?;
    get_round(State(state), Path(job_id)).await
}

#[derive(Deserialize)]
struct RevealRequest {
    validator: Uuid,
    approve: bool,
    #[serde(default)]
    burn_tx: Option<String>,
    salt: String,
    #[serde(default)]
    claim: IdentityClaim,
}

async fn reveal_validation(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<RevealRequest>,
) -> ApiResult<RoundSummary> {
    let ballot = Ballot {
        approve: req.approve,
        burn_tx: parse_optional_hash("burn_tx", req.burn_tx.as_deref())?,
        salt: parse_hash("salt", &req.salt)?,
    };
    let result = state
        .registry
        .reveal_validation(req.validator, job_id, &ballot, &req.claim);
    audited(&state, result).await?;
    get_round(State(state), Path(job_id)).await
}

#[derive(Serialize, Deserialize)]
pub struct OutcomeResponse {
    pub job_id: JobId,
    pub outcome: ValidationOutcome,
    pub state: JobState,
}

async fn outcome_response(
    state: &AppState,
    job_id: JobId,
    result: agora_types::Result<ValidationOutcome>,
) -> ApiResult<OutcomeResponse> {
    let outcome = audited(state, result).await?;
    let job = state.registry.job(job_id)?;
    Ok(Json(OutcomeResponse {
        job_id,
        outcome,
        state: job.state,
    }))
}

async fn finalize_validation(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<OutcomeResponse> {
    let result = state.registry.finalize_validation(job_id);
    outcome_response(&state, job_id, result).await
}

async fn force_finalize_validation(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<OutcomeResponse> {
    let result = state.registry.force_finalize_validation(job_id);
    outcome_response(&state, job_id, result).await
}

#[derive(Deserialize)]
struct CallerRequest {
    caller: Uuid,
}

async fn restart_validation(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<RoundSummary> {
    let result = state.registry.restart_validation(req.caller, job_id);
    Ok(Json(audited(&state, result).await?))
}

// ---- disputes --------------------------------------------------------------------------

#[derive(Deserialize)]
struct DisputeRequest {
    caller: Uuid,
    evidence: String,
}

async fn raise_dispute(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Job> {
    let evidence = parse_hash("evidence", &req.evidence)?;
    let result = state.registry.raise_dispute(req.caller, job_id, evidence);
    audited(&state, result).await?;
    Ok(Json(state.registry.job(job_id)?))
}

async fn get_dispute(State(state): State<AppState>, Path(job_id): Path<JobId>) -> ApiResult<CaseSummary> {
    state
        .registry
        .dispute_case(job_id)
        .map(Json)
        .ok_or_else(|| AgoraError::DisputeNotFound(job_id).into())
}

#[derive(Deserialize)]
struct JurorCommitRequest {
    juror: Uuid,
    commitment: String,
}

async fn commit_dispute(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<JurorCommitRequest>,
) -> ApiResult<CaseSummary> {
    let commitment = parse_hash("commitment", &req.commitment)?;
    let result = state.registry.commit_dispute(req.juror, job_id, commitment);
    audited(&state, result).await?;
    get_dispute(State(state), Path(job_id)).await
}

#[derive(Deserialize)]
struct JurorRevealRequest {
    juror: Uuid,
    favor_employer: bool,
    salt: String,
}

async fn reveal_dispute(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<JurorRevealRequest>,
) -> ApiResult<CaseSummary> {
    let salt = parse_hash("salt", &req.salt)?;
    let result = state
        .registry
        .reveal_dispute(req.juror, job_id, req.favor_employer, salt);
    audited(&state, result).await?;
    get_dispute(State(state), Path(job_id)).await
}

#[derive(Deserialize)]
struct RulingRequest {
    caller: Uuid,
    favor_employer: bool,
}

async fn deliver_ruling(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<RulingRequest>,
) -> ApiResult<CaseSummary> {
    let Arbitration::External(arbitrator) = &state.arbitration else {
        return Err(ApiError::NotConfigured("external arbitration"));
    };
    arbitrator.deliver(req.caller, job_id, req.favor_employer)?;
    get_dispute(State(state), Path(job_id)).await
}

async fn resolve_dispute(State(state): State<AppState>, Path(job_id): Path<JobId>) -> ApiResult<Settlement> {
    let result = state.registry.resolve_dispute(job_id);
    Ok(Json(audited(&state, result).await?))
}

#[derive(Deserialize)]
struct OverrideRequest {
    caller: Uuid,
    favor_employer: bool,
    #[serde(default)]
    reason: String,
}

async fn governance_resolve(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<OverrideRequest>,
) -> ApiResult<Settlement> {
    let result = state
        .registry
        .governance_resolve(req.caller, job_id, req.favor_employer, req.reason);
    Ok(Json(audited(&state, result).await?))
}

// ---- settlement and exits --------------------------------------------------------------

async fn finalize(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<Settlement> {
    let result = state.registry.finalize(req.caller, job_id);
    Ok(Json(audited(&state, result).await?))
}

#[derive(Serialize, Deserialize)]
pub struct RefundResponse {
    pub job_id: JobId,
    pub refunded: u64,
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<RefundResponse> {
    let result = state.registry.cancel_job(req.caller, job_id);
    let refunded = audited(&state, result).await?;
    Ok(Json(RefundResponse { job_id, refunded }))
}

async fn delist_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<RefundResponse> {
    let result = state.registry.delist_job(req.caller, job_id);
    let refunded = audited(&state, result).await?;
    Ok(Json(RefundResponse { job_id, refunded }))
}

async fn expire_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(req): Json<CallerRequest>,
) -> ApiResult<RefundResponse> {
    let result = state.registry.cancel_expired_job(req.caller, job_id);
    let refunded = audited(&state, result).await?;
    Ok(Json(RefundResponse { job_id, refunded }))
}

// ---- stake and token -------------------------------------------------------------------

#[derive(Deserialize)]
struct StakeRequest {
    holder: Uuid,
    role: Role,
    amount: u64,
}

#[derive(Serialize, Deserialize)]
pub struct StakeView {
    pub holder: Uuid,
    pub role: Role,
    pub account: StakeAccount,
    pub locked: u64,
    pub boosted: u64,
}

fn stake_view(state: &AppState, holder: Uuid, role: Role) -> StakeView {
    let stake = state.registry.stake_manager();
    StakeView {
        holder,
        role,
        account: stake.account(holder, role),
        locked: stake.locked_of(holder, role, state.registry.now()),
        boosted: stake.boosted_stake_of(holder, role),
    }
}

async fn deposit(State(state): State<AppState>, Json(req): Json<StakeRequest>) -> ApiResult<StakeView> {
    let result = state
        .registry
        .stake_manager()
        .deposit(req.holder, req.role, req.amount);
    audited(&state, result).await?;
    Ok(Json(stake_view(&state, req.holder, req.role)))
}

async fn withdraw(State(state): State<AppState>, Json(req): Json<StakeRequest>) -> ApiResult<StakeView> {
    let now = state.registry.now();
    let result = state
        .registry
        .stake_manager()
        .withdraw(req.holder, req.role, req.amount, now);
    audited(&state, result).await?;
    Ok(Json(stake_view(&state, req.holder, req.role)))
}

#[derive(Serialize, Deserialize)]
pub struct UnbondResponse {
    pub unlock_at: u64,
}

async fn request_withdraw(
    State(state): State<AppState>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<UnbondResponse> {
    let now = state.registry.now();
    let result = state
        .registry
        .stake_manager()
        .request_withdraw(req.holder, req.role, req.amount, now);
    let unlock_at = audited(&state, result).await?;
    Ok(Json(UnbondResponse { unlock_at }))
}

#[derive(Deserialize)]
struct FinalizeWithdrawRequest {
    holder: Uuid,
    role: Role,
}

async fn finalize_withdraw(
    State(state): State<AppState>,
    Json(req): Json<FinalizeWithdrawRequest>,
) -> ApiResult<StakeView> {
    let now = state.registry.now();
    let result = state
        .registry
        .stake_manager()
        .finalize_withdraw(req.holder, req.role, now);
    audited(&state, result).await?;
    Ok(Json(stake_view(&state, req.holder, req.role)))
}

async fn get_stake(State(state): State<AppState>, Path(holder): Path<Uuid>) -> Json<Vec<StakeView>> {
    Json(Role::ALL.iter().map(|role| stake_view(&state, holder, *role)).collect())
}

#[derive(Deserialize)]
struct MintRequest {
    caller: Uuid,
    to: Uuid,
    amount: u64,
}

#[derive(Serialize, Deserialize)]
pub struct BalanceResponse {
    pub holder: Uuid,
    pub balance: u64,
}

async fn mint(State(state): State<AppState>, Json(req): Json<MintRequest>) -> ApiResult<BalanceResponse> {
    ensure_governance(&state, req.caller)?;
    state.token.mint(req.to, req.amount);
    Ok(Json(BalanceResponse {
        holder: req.to,
        balance: state.token.balance_of(req.to),
    }))
}

async fn get_balance(State(state): State<AppState>, Path(holder): Path<Uuid>) -> Json<BalanceResponse> {
    Json(BalanceResponse {
        holder,
        balance: state.token.balance_of(holder),
    })
}

// ---- policy and beacon -----------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub struct PolicyResponse {
    pub version: u64,
    pub uri: String,
}

async fn get_policy(State(state): State<AppState>) -> Json<PolicyResponse> {
    Json(PolicyResponse {
        version: state.policy.version(),
        uri: state.policy.uri(),
    })
}

#[derive(Deserialize)]
struct AcknowledgeRequest {
    who: Uuid,
}

async fn acknowledge_policy(
    State(state): State<AppState>,
    Json(req): Json<AcknowledgeRequest>,
) -> Json<PolicyResponse> {
    let version = state.policy.acknowledge(req.who);
    Json(PolicyResponse {
        version,
        uri: state.policy.uri(),
    })
}

#[derive(Deserialize)]
struct BeaconCommitRequest {
    participant: Uuid,
    tag: String,
    commitment: String,
}

async fn beacon_commit(
    State(state): State<AppState>,
    Json(req): Json<BeaconCommitRequest>,
) -> Result<StatusCode, ApiError> {
    let beacon = state.beacon.clone().ok_or(ApiError::NotConfigured("randomness beacon"))?;
    let tag = parse_hash("tag", &req.tag)?;
    let commitment = parse_hash("commitment", &req.commitment)?;
    let result = beacon.commit(req.participant, tag, commitment, state.registry.now());
    audited(&state, result).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct BeaconRevealRequest {
    participant: Uuid,
    tag: String,
    secret: String,
}

async fn beacon_reveal(
    State(state): State<AppState>,
    Json(req): Json<BeaconRevealRequest>,
) -> Result<StatusCode, ApiError> {
    let beacon = state.beacon.clone().ok_or(ApiError::NotConfigured("randomness beacon"))?;
    let tag = parse_hash("tag", &req.tag)?;
    let secret = parse_hash("secret", &req.secret)?;
    let result = beacon.reveal(req.participant, tag, secret, state.registry.now());
    audited(&state, result).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct BeaconForfeitRequest {
    participant: Uuid,
    tag: String,
}

#[derive(Serialize, Deserialize)]
pub struct ForfeitResponse {
    pub forfeited: u64,
}

async fn beacon_forfeit(
    State(state): State<AppState>,
    Json(req): Json<BeaconForfeitRequest>,
) -> ApiResult<ForfeitResponse> {
    let beacon = state.beacon.clone().ok_or(ApiError::NotConfigured("randomness beacon"))?;
    let tag = parse_hash("tag", &req.tag)?;
    let result = beacon.forfeit(tag, req.participant, state.registry.now());
    let forfeited = audited(&state, result).await?;
    Ok(Json(ForfeitResponse { forfeited }))
}

// ---- governance ------------------------------------------------------------------------

#[derive(Deserialize)]
struct RegistryConfigRequest {
    caller: Uuid,
    config: RegistryConfig,
}

async fn set_registry_config(
    State(state): State<AppState>,
    Json(req): Json<RegistryConfigRequest>,
) -> ApiResult<RegistryConfig> {
    let result = state.registry.set_config(req.caller, req.config);
    audited(&state, result).await?;
    Ok(Json(state.registry.config()))
}

#[derive(Deserialize)]
struct ValidatorRequest {
    caller: Uuid,
    validator: Uuid,
}

async fn add_validator(
    State(state): State<AppState>,
    Json(req): Json<ValidatorRequest>,
) -> ApiResult<Vec<Uuid>> {
    state.validation.add_validator(req.caller, req.validator)?;
    Ok(Json(state.validation.pool()))
}

#[derive(Deserialize)]
struct BlacklistRequest {
    caller: Uuid,
    who: Uuid,
    blacklisted: bool,
}

async fn set_blacklisted(
    State(state): State<AppState>,
    Json(req): Json<BlacklistRequest>,
) -> Result<StatusCode, ApiError> {
    ensure_governance(&state, req.caller)?;
    state.registry.reputation().set_blacklisted(req.who, req.blacklisted);
    tracing::info!(who = %req.who, blacklisted = req.blacklisted, "blacklist updated");
    Ok(StatusCode::NO_CONTENT)
}

// ---- audit -----------------------------------------------------------------------------

async fn list_audit(State(state): State<AppState>) -> ApiResult<Vec<AuditEntry>> {
    Ok(Json(state.audit.all_entries().await?))
}

async fn job_audit(State(state): State<AppState>, Path(job_id): Path<JobId>) -> ApiResult<Vec<AuditEntry>> {
    Ok(Json(state.audit.query_by_job(job_id).await?))
}

#[derive(Serialize, Deserialize)]
pub struct IntegrityResponse {
    pub entries: usize,
    pub valid: bool,
    pub latest_hash: Option<String>,
}

async fn verify_audit(State(state): State<AppState>) -> ApiResult<IntegrityResponse> {
    Ok(Json(IntegrityResponse {
        entries: state.audit.len().await?,
        valid: state.audit.verify_integrity().await?,
        latest_hash: state.audit.latest_hash().await?,
    }))
}
