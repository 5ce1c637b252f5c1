//! The session's owning task (spec §4.5): one spawned task per active
//! session, driving entry, the step machine, the two timeout tickers, and
//! termination. Modeled on the teacher's `music::queue_run`/`QueueState`.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, Instant};
use tracing::{info, instrument, warn};
use twilight_model::id::{marker::ChannelMarker, Id};

use crate::constants::{EVENT_QUIESCENCE_DELAY, INACTIVITY_TICK, SESSION_INACTIVITY_TIMEOUT, SESSION_TOTAL_TIMEOUT, STEP_COUNT, VOICE_DISCONNECT_TIMEOUT};
use crate::platform::{ChannelGrant, Platform};
use crate::queue::{CompleteOutcome, CompletePayload, StartPayload, Task};
use crate::step::{self, step3::Step3Phase, Phase, StepContext};
use crate::token::Action;
use crate::voice::VoiceConnection;

use super::{RouterCommand, SessionDeps, SessionHandle, SessionKey, SessionProjection, SessionStore};

pub struct SessionContext<P: Platform> {
    pub store: SessionStore,
    pub platform: Arc<P>,
    pub deps: SessionDeps,
    pub key: SessionKey,
    pub category_id: Id<ChannelMarker>,
    pub payload: StartPayload,
    pub command_rx: UnboundedReceiver<RouterCommand>,
    pub handle: Arc<SessionHandle>,
}

/// Why the session's main loop ended, driving both the cleanup sequence and
/// the acknowledgement task's outcome field (spec §4.5, §4.8).
#[derive(Debug)]
enum TerminationReason {
    Completed,
    Inactivity,
    Total,
    Cancelled,
    Fatal(String),
}

/// Everything the termination sequence needs, regardless of how far entry
/// got before failing.
struct RunOutcome {
    channel_id: Option<Id<ChannelMarker>>,
    conn: Option<VoiceConnection>,
    reason: TerminationReason,
}

#[instrument(skip(ctx), fields(guild_id = %ctx.key.0, user_id = %ctx.key.1))]
pub async fn run<P: Platform + 'static>(mut ctx: SessionContext<P>) {
    let (guild_id, user_id) = ctx.key;

    let RunOutcome { channel_id, conn, reason } = run_inner(&mut ctx).await;

    // Termination, in order (spec §4.5 (a)-(f)). Every step is best-effort;
    // none blocks the rest of cleanup.
    if let Some(conn) = &conn {
        crate::audio::stop(conn);
    }

    // (b) Dropping the connection tears down its background task (its
    // command/gateway channels close, which the task treats as a hangup).
    // Capped defensively in case that ever grows an async leave step.
    let _ = tokio::time::timeout(VOICE_DISCONNECT_TIMEOUT, async { drop(conn) }).await;

    if let Some(channel_id) = channel_id {
        if let Err(err) = ctx.platform.delete_channel(channel_id).await {
            warn!(%err, "failed to delete onboarding channel during cleanup");
        }
    }

    ctx.store.unmirror(guild_id, user_id).await;
    ctx.store.remove(ctx.key).await;

    if let Err(err) = ctx.deps.registry.mark_available(&ctx.deps.worker_id).await {
        warn!(%err, "failed to mark worker available after session end");
    }

    let completion_outcome = match &reason {
        TerminationReason::Completed => CompleteOutcome::Finished,
        TerminationReason::Inactivity | TerminationReason::Total => CompleteOutcome::Timeout,
        TerminationReason::Cancelled => CompleteOutcome::Cancelled,
        TerminationReason::Fatal(_) => CompleteOutcome::Cancelled,
    };

    let task = Task::complete(
        guild_id,
        CompletePayload {
            user_id,
            outcome: completion_outcome,
        },
        chrono::Utc::now().timestamp(),
    );
    if let Err(err) = ctx.deps.queue.enqueue(&task).await {
        warn!(%err, "failed to enqueue onboarding_complete acknowledgement");
    }

    info!(?reason, "session ended");
}

/// Live, in-progress session state, held only inside [`run_inner`]'s loop.
struct RunState {
    channel_id: Id<ChannelMarker>,
    conn: VoiceConnection,
    phase: Phase,
    guide: Option<String>,
    started_at: i64,
}

async fn run_inner<P: Platform + 'static>(ctx: &mut SessionContext<P>) -> RunOutcome {
    let (guild_id, user_id) = ctx.key;
    let started_at = chrono::Utc::now().timestamp();

    // Entry sequence (spec §4.5).
    grant_in_progress(ctx).await;

    let username = user_id.to_string();
    let channel_id = match ctx
        .platform
        .create_onboarding_channel(guild_id, ctx.category_id, &username, ChannelGrant { user_id })
        .await
    {
        Ok(channel_id) => channel_id,
        Err(err) => {
            return RunOutcome {
                channel_id: None,
                conn: None,
                reason: TerminationReason::Fatal(err.to_string()),
            }
        }
    };

    let conn = match ctx.platform.join_voice(guild_id, channel_id).await {
        Ok(conn) => conn,
        Err(err) => {
            return RunOutcome {
                channel_id: Some(channel_id),
                conn: None,
                reason: TerminationReason::Fatal(err.to_string()),
            }
        }
    };

    let mut state = RunState {
        channel_id,
        conn,
        phase: Phase::GuideMenu,
        guide: None,
        started_at,
    };

    mirror(ctx, &state).await;

    if let Err(err) = crate::guide::send_menu(ctx.platform.as_ref(), channel_id, user_id, &ctx.deps.audio_root).await {
        warn!(%err, "failed to send guide menu");
    }

    let total_deadline = Instant::now() + SESSION_TOTAL_TIMEOUT;
    let mut inactivity_ticker = interval(INACTIVITY_TICK);
    let mut event_quiescence: Option<Instant> = None;

    let reason = loop {
        tokio::select! {
            biased;

            _ = tokio::time::sleep_until(total_deadline) => {
                break TerminationReason::Total;
            }
            _ = inactivity_ticker.tick() => {
                let idle = chrono::Utc::now().timestamp() - ctx.handle.last_activity();
                if idle >= SESSION_INACTIVITY_TIMEOUT.as_secs() as i64 {
                    break TerminationReason::Inactivity;
                }
            }
            _ = sleep_until_opt(event_quiescence) => {
                event_quiescence = None;
                if let Phase::Step3(Step3Phase::Event) = state.phase {
                    advance_step3(ctx, &mut state, Step3Phase::Done).await;
                }
            }
            command = ctx.command_rx.recv() => {
                match command {
                    Some(RouterCommand::Cancel) => break TerminationReason::Cancelled,
                    Some(RouterCommand::Action { action, params }) => {
                        handle_action(ctx, &mut state, action, &params, &mut event_quiescence).await;
                        mirror(ctx, &state).await;
                    }
                    None => break TerminationReason::Cancelled,
                }
            }
        }

        if matches!(state.phase, Phase::Terminated) {
            break TerminationReason::Completed;
        }
    };

    RunOutcome {
        channel_id: Some(state.channel_id),
        conn: Some(state.conn),
        reason,
    }
}

async fn grant_in_progress<P: Platform>(ctx: &SessionContext<P>) {
    if let Some(role_id) = ctx.payload.in_progress_role {
        if let Err(err) = ctx.platform.add_role(ctx.key.0, ctx.key.1, role_id).await {
            warn!(%err, "failed to grant in-progress role");
        }
    }
}

fn step_context<'a, P: Platform>(ctx: &'a SessionContext<P>, state: &'a RunState) -> StepContext<'a, P> {
    StepContext {
        platform: ctx.platform.as_ref(),
        channel_id: state.channel_id,
        user_id: ctx.key.1,
        guild_id: ctx.key.0,
        roles: &ctx.payload,
        guide: state.guide.as_deref().unwrap_or("default"),
        audio_root: &ctx.deps.audio_root,
    }
}

async fn handle_action<P: Platform + 'static>(
    ctx: &mut SessionContext<P>,
    state: &mut RunState,
    action: Action,
    params: &[String],
    event_quiescence: &mut Option<Instant>,
) {
    ctx.handle.touch(chrono::Utc::now().timestamp());
    let user_id = ctx.key.1;

    match (state.phase, action) {
        (Phase::GuideMenu, Action::Preview) => {
            // Previewing a guide doesn't advance the phase; it only plays
            // that guide's sample voice line.
            if let Some(guide) = params.first() {
                if let Err(err) = crate::guide::play_preview(&state.conn, &ctx.deps.audio_root, guide).await {
                    warn!(%err, guide, "guide preview failed to play");
                }
            }
        }
        (Phase::GuideMenu, Action::SelectGuide) => {
            state.guide = params.first().cloned();
            state.phase = Phase::GuideConfirm;
            if let Some(guide) = state.guide.clone() {
                if let Err(err) = crate::guide::send_confirm(ctx.platform.as_ref(), state.channel_id, user_id, &guide).await {
                    warn!(%err, "failed to send guide confirmation");
                }
            }
        }
        (Phase::GuideConfirm, Action::BackToGuideSelection) => {
            state.phase = Phase::GuideMenu;
            if let Err(err) = crate::guide::send_menu(ctx.platform.as_ref(), state.channel_id, user_id, &ctx.deps.audio_root).await {
                warn!(%err, "failed to re-send guide menu");
            }
        }
        (Phase::GuideConfirm, Action::ConfirmGuide) => {
            enter_step(ctx, state, 1).await;
        }
        (Phase::Step(n), Action::StepNext(m)) if m == n => {
            advance_past_step(ctx, state, n).await;
        }
        (Phase::Step(n), Action::StepReplay(m)) if m == n => {
            let sctx = step_context(ctx, state);
            if let Err(err) = step::replay_step(&sctx, &state.conn, n).await {
                warn!(%err, "step replay failed");
            }
        }
        (Phase::Step3(sub), Action::Age)
        | (Phase::Step3(sub), Action::Voice)
        | (Phase::Step3(sub), Action::Eroipu)
        | (Phase::Step3(sub), Action::Neochi)
        | (Phase::Step3(sub), Action::NeochiHandling)
        | (Phase::Step3(sub), Action::Dm)
        | (Phase::Step3(sub), Action::Friend) => {
            grant_answer_role(ctx, state, sub, params).await;
            let next = sub.next();
            advance_step3(ctx, state, next).await;
        }
        (Phase::Step3(Step3Phase::Event), Action::Event) => {
            grant_answer_role(ctx, state, Step3Phase::Event, params).await;
            *event_quiescence = Some(Instant::now() + EVENT_QUIESCENCE_DELAY);
        }
        (Phase::Step3(Step3Phase::Done), Action::Step3Next) => {
            {
                let sctx = step_context(ctx, state);
                sctx.grant(step::role_keys::MILESTONE_3).await;
            }
            enter_step(ctx, state, 4).await;
        }
        (Phase::Step(7), Action::Step7Complete) => {
            let sctx = step_context(ctx, state);
            if let Err(err) = step::complete(&sctx, &state.conn).await {
                warn!(%err, "step 7 completion failed");
            }
            state.phase = Phase::Terminated;
        }
        _ => {
            // Stale or mismatched button for the current phase (spec §4.6:
            // a button from an earlier render no longer matching the
            // session's current step). Ignored.
        }
    }
}

async fn advance_past_step<P: Platform + 'static>(ctx: &mut SessionContext<P>, state: &mut RunState, n: u8) {
    if n == 2 {
        let skip = {
            let sctx = step_context(ctx, state);
            step::should_skip_step3(&sctx).await
        };
        if skip {
            enter_step(ctx, state, 4).await;
            return;
        }

        state.phase = Phase::Step3(Step3Phase::Age);
        ctx.handle.set_current_step(3);
        let sctx = step_context(ctx, state);
        if let Err(err) = crate::step::step3::enter(&sctx, &state.conn, Step3Phase::Age).await {
            warn!(%err, "failed to enter step 3 sub-tree");
        }
        return;
    }

    if n >= STEP_COUNT {
        state.phase = Phase::Completing;
        return;
    }

    enter_step(ctx, state, n + 1).await;
}

async fn enter_step<P: Platform + 'static>(ctx: &mut SessionContext<P>, state: &mut RunState, n: u8) {
    state.phase = Phase::Step(n);
    ctx.handle.set_current_step(n);
    let sctx = step_context(ctx, state);
    if let Err(err) = step::enter_step(&sctx, &state.conn, n).await {
        warn!(%err, step = n, "failed to enter step");
    }
}

async fn advance_step3<P: Platform + 'static>(ctx: &mut SessionContext<P>, state: &mut RunState, next: Step3Phase) {
    state.phase = Phase::Step3(next);
    let sctx = step_context(ctx, state);
    if let Err(err) = crate::step::step3::enter(&sctx, &state.conn, next).await {
        warn!(%err, "failed to enter step 3 sub-step");
    }
}

/// Grants the role configured for the answer `params[0]` picked at `sub`
/// (spec §4.6: each sub-step's option maps to a configured role by key
/// `"{sub}_{param}"`, resolved via [`crate::step::step3::role_key`]).
async fn grant_answer_role<P: Platform>(ctx: &SessionContext<P>, state: &RunState, sub: Step3Phase, params: &[String]) {
    let Some(param) = params.first() else {
        warn!(?sub, "answer action missing its param; skipping role grant");
        return;
    };
    let key = crate::step::step3::role_key(sub, param);
    let sctx = step_context(ctx, state);
    sctx.grant(&key).await;
}

async fn mirror<P: Platform>(ctx: &SessionContext<P>, state: &RunState) {
    let projection = SessionProjection {
        guild_id: ctx.key.0,
        user_id: ctx.key.1,
        voice_channel_id: state.channel_id,
        guide: state.guide.clone(),
        phase: state.phase,
        started_at: state.started_at,
    };
    ctx.store.mirror(&projection).await;
}

fn sleep_until_opt(deadline: Option<Instant>) -> impl std::future::Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
