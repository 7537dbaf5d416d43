//! Route handlers. Every reply is the uniform envelope with HTTP 200.

use crate::cache::keys;
use crate::identity::SmsError;
use crate::protocol::{
    ApiCode, ApiResponse, GameResultCallback, ListRoomsQuery, ReadyData, RoomQuery, RoomRequest,
    SitData, SitRequest, SmsIssueData, SmsIssueRequest, SmsVerifyData, SmsVerifyRequest,
    HDR_SEC_ACCOUNT,
};
use crate::room::RoomError;
use crate::server::context::AppContext;
use crate::store::{NewUser, RoomActor, TransitionError};
use crate::timeouts::{TASK_BATTLE_OFF, TASK_QUEUE_KICK};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

type Ctx = State<Arc<AppContext>>;
type Reply = Json<ApiResponse<Value>>;

fn ok(data: impl Serialize) -> Reply {
    match serde_json::to_value(data) {
        Ok(value) => Json(ApiResponse::ok(value)),
        Err(err) => {
            error!(error = %err, "failed to serialize response payload");
            Json(ApiResponse::failure(ApiCode::Internal))
        }
    }
}

fn ok_empty() -> Reply {
    Json(ApiResponse::ok_empty())
}

fn fail(code: ApiCode) -> Reply {
    Json(ApiResponse::failure(code))
}

fn fail_with(code: ApiCode, data: Value) -> Reply {
    Json(ApiResponse::failure_with(code, data))
}

/// Unwrap a JSON body, mapping malformed payloads into the envelope.
macro_rules! body_or_reply {
    ($payload:expr) => {
        match $payload {
            Ok(Json(body)) => body,
            Err(rejection) => {
                warn!(error = %rejection, "rejected malformed request body");
                return fail(ApiCode::Internal);
            }
        }
    };
}

pub async fn index() -> Reply {
    ok_empty()
}

// Identity ------------------------------------------------------------------

pub async fn sms_issue(
    State(ctx): Ctx,
    payload: Result<Json<SmsIssueRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    match ctx.sms.issue(&body.phone_number).await {
        Ok(remaining) => ok(SmsIssueData { remaining }),
        Err(err) => fail(sms_code(&err)),
    }
}

pub async fn sms_verify(
    State(ctx): Ctx,
    payload: Result<Json<SmsVerifyRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    if let Err(err) = ctx.sms.verify(&body.phone_number, &body.code).await {
        return fail(sms_code(&err));
    }

    let account = body.phone_number.clone();
    let existing = match ctx.store.user_by_account(&account).await {
        Ok(existing) => existing,
        Err(err) => {
            error!(error = %err, "account lookup failed");
            return fail(ApiCode::Internal);
        }
    };

    let new_user = NewUser {
        uid: None,
        account: account.clone(),
        device_type: body.device_type,
        device_id: body.device_id.clone(),
        push_registration_id: body.push_registration_id.clone(),
    };
    let user = match existing {
        Some(user) if !user.is_deleted => user,
        Some(user) => {
            // Deleted-then-reverified. Inside the re-activation window the
            // old identity comes back; past it the fresh identity lives in
            // the shadow collection and the old data stays with the old uid.
            let expired = ctx
                .store
                .is_activation_expired(&account)
                .await
                .unwrap_or(true);
            if expired {
                match ctx.store.create_user(new_user, true).await {
                    Ok(user) => user,
                    Err(err) => {
                        error!(error = %err, "account recreation failed");
                        return fail(ApiCode::Internal);
                    }
                }
            } else {
                if let Err(err) = ctx.store.restore_user(&account).await {
                    error!(error = %err, "account restore failed");
                    return fail(ApiCode::Internal);
                }
                user
            }
        }
        None => match ctx.store.create_user(new_user, false).await {
            Ok(user) => {
                let counter = keys::total_user_cnt(&ctx.config.server.deploy_env);
                if let Err(err) = ctx.cache.incr(&counter).await {
                    warn!(error = %err, "total user counter increment failed");
                }
                user
            }
            Err(err) => {
                error!(error = %err, "account creation failed");
                return fail(ApiCode::Internal);
            }
        },
    };

    if let Err(err) = ctx.auth.bind_device(&account, &body.device_id).await {
        error!(error = %err, "device binding failed");
        return fail(ApiCode::Internal);
    }
    if let Err(err) = ctx.store.set_user_online(&account, true).await {
        warn!(error = %err, "online flag update failed");
    }

    match ctx.tokens.issue(&account, &body.device_id) {
        Ok(token) => ok(SmsVerifyData {
            uid: user.uid,
            account,
            token,
        }),
        Err(err) => {
            error!(error = %err, "token mint failed");
            fail(ApiCode::Internal)
        }
    }
}

fn sms_code(err: &SmsError) -> ApiCode {
    match err {
        SmsError::InvalidMobile(_) => ApiCode::InvalidMobile,
        SmsError::TokenBucketExhausted(_) => ApiCode::TokenBucketExhausted,
        SmsError::CodeExpired(_) => ApiCode::CodeExpired,
        SmsError::CodeMismatch(_) => ApiCode::CodeMismatch,
        SmsError::Infra(inner) => {
            error!(error = %inner, "SMS infrastructure failure");
            ApiCode::Internal
        }
    }
}

// Rooms ---------------------------------------------------------------------

async fn current_actor(
    ctx: &AppContext,
    headers: &HeaderMap,
    room_id: String,
) -> Result<RoomActor, ApiCode> {
    let account = headers
        .get(HDR_SEC_ACCOUNT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let user = ctx
        .store
        .user_by_account(account)
        .await
        .map_err(|err| {
            error!(error = %err, "profile lookup failed");
            ApiCode::Internal
        })?
        .ok_or(ApiCode::Unauthorized)?;
    Ok(RoomActor {
        room_id,
        user_id: user.uid,
        user_nickname: user.nickname,
        user_avatar: user.avatar,
    })
}

fn room_error_reply(err: RoomError) -> Reply {
    match err {
        RoomError::Transition(TransitionError::QueueFull { .. }) => fail(ApiCode::QueueFull),
        RoomError::Transition(TransitionError::SeatOccupied { .. }) => fail(ApiCode::SeatOccupied),
        RoomError::Transition(TransitionError::SeatOutOfBounds { .. }) => {
            fail(ApiCode::SeatOutOfBounds)
        }
        RoomError::Transition(TransitionError::Frozen { seconds_left, .. }) => {
            fail_with(ApiCode::SeatFrozen, json!({ "seconds_left": seconds_left }))
        }
        RoomError::Transition(TransitionError::InBattle { .. }) => fail(ApiCode::InBattle),
        RoomError::Transition(TransitionError::NotSeated { .. }) => fail(ApiCode::NotSeated),
        RoomError::Transition(TransitionError::RoomNotFound(room_id)) => {
            warn!(room_id, "operation on unknown room");
            fail(ApiCode::Internal)
        }
        RoomError::Transition(TransitionError::Storage(err)) => {
            error!(error = %err, "store failure during transition");
            fail(ApiCode::Internal)
        }
        RoomError::LockUnavailable { .. } => fail(ApiCode::Internal),
    }
}

fn kick_key(ctx: &AppContext, uid: &str) -> String {
    keys::background_delay_task(&ctx.config.server.deploy_env, uid, TASK_QUEUE_KICK)
}

fn battle_off_key(ctx: &AppContext, uid: &str) -> String {
    keys::background_delay_task(&ctx.config.server.deploy_env, uid, TASK_BATTLE_OFF)
}

/// Arm the queue idle kick for a seated user.
fn schedule_queue_kick(ctx: &Arc<AppContext>, actor: &RoomActor) {
    let engine = ctx.engine.clone();
    let actor = actor.clone();
    ctx.scheduler.schedule(
        kick_key(ctx, &actor.user_id),
        Duration::from_secs(ctx.config.room.queue_kick_secs),
        move || async move {
            match engine.stand(&actor, true).await {
                Ok(_) => warn!(
                    room_id = %actor.room_id,
                    uid = %actor.user_id,
                    "idle user kicked from the queue"
                ),
                Err(err) => warn!(
                    room_id = %actor.room_id,
                    uid = %actor.user_id,
                    error = %err,
                    "queue idle kick failed"
                ),
            }
        },
    );
}

/// Arm the battle turn-off for a user who entered a battle.
fn schedule_battle_off(ctx: &Arc<AppContext>, actor: &RoomActor) {
    let engine = ctx.engine.clone();
    let actor = actor.clone();
    ctx.scheduler.schedule(
        battle_off_key(ctx, &actor.user_id),
        Duration::from_secs(ctx.config.room.battle_off_secs),
        move || async move {
            match engine.end_battle(&actor).await {
                Ok(_) => warn!(
                    room_id = %actor.room_id,
                    uid = %actor.user_id,
                    "stale battle turned off"
                ),
                Err(err) => warn!(
                    room_id = %actor.room_id,
                    uid = %actor.user_id,
                    error = %err,
                    "battle turn-off failed"
                ),
            }
        },
    );
}

pub async fn room_enter(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.enter_room(&actor).await {
        Ok(()) => ok_empty(),
        Err(err) => room_error_reply(err),
    }
}

pub async fn room_leave(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.leave_room(&actor).await {
        Ok(()) => {
            ctx.scheduler.cancel(&kick_key(&ctx, &actor.user_id));
            ok_empty()
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn queue_sit(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<SitRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.sit(&actor, body.x, body.y).await {
        Ok(shift) => {
            if shift.applied {
                schedule_queue_kick(&ctx, &actor);
            }
            ok(SitData {
                queue_is_full: shift.queue_is_full,
            })
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn queue_stand(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.stand(&actor, false).await {
        Ok(_) => {
            ctx.scheduler.cancel(&kick_key(&ctx, &actor.user_id));
            ok_empty()
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn queue_ready(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.ready(&actor).await {
        Ok(shift) => {
            // A ready user is progressing; the idle kick no longer applies.
            ctx.scheduler.cancel(&kick_key(&ctx, &actor.user_id));
            ok(ReadyData {
                completed: shift.all_ready,
            })
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn queue_unready(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.unready(&actor).await {
        Ok(shift) => {
            if shift.applied {
                schedule_queue_kick(&ctx, &actor);
            }
            ok_empty()
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn battle_start(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.start_battle(&actor).await {
        Ok(shift) => {
            if shift.applied {
                ctx.scheduler.cancel(&kick_key(&ctx, &actor.user_id));
                schedule_battle_off(&ctx, &actor);
            }
            ok(ReadyData {
                completed: shift.all_in_battle,
            })
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn battle_end(
    State(ctx): Ctx,
    headers: HeaderMap,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    let actor = match current_actor(&ctx, &headers, body.room_id).await {
        Ok(actor) => actor,
        Err(code) => return fail(code),
    };
    match ctx.engine.end_battle(&actor).await {
        Ok(_) => {
            ctx.scheduler.cancel(&battle_off_key(&ctx, &actor.user_id));
            ok_empty()
        }
        Err(err) => room_error_reply(err),
    }
}

pub async fn room_list(State(ctx): Ctx, Query(query): Query<ListRoomsQuery>) -> Reply {
    if query.fast {
        match ctx
            .engine
            .list_rooms_fast(&query.game_index, query.offset, query.limit)
            .await
        {
            Ok(rooms) => ok(json!({ "rooms": rooms })),
            Err(err) => {
                error!(error = %err, "fast room listing failed");
                fail(ApiCode::Internal)
            }
        }
    } else {
        match ctx
            .engine
            .list_rooms_full(&query.game_index, query.offset, query.limit)
            .await
        {
            Ok(rooms) => ok(json!({ "rooms": rooms })),
            Err(err) => {
                error!(error = %err, "room listing failed");
                fail(ApiCode::Internal)
            }
        }
    }
}

pub async fn room_get(State(ctx): Ctx, Query(query): Query<RoomQuery>) -> Reply {
    if query.fast {
        match ctx.engine.get_room_fast(&query.room_id).await {
            Ok(Some(room)) => ok(room),
            Ok(None) => {
                warn!(room_id = %query.room_id, "queried unknown room");
                fail(ApiCode::Internal)
            }
            Err(err) => {
                error!(error = %err, "room query failed");
                fail(ApiCode::Internal)
            }
        }
    } else {
        match ctx.engine.get_room_full(&query.room_id).await {
            Ok(Some(room)) => ok(room),
            Ok(None) => {
                warn!(room_id = %query.room_id, "queried unknown room");
                fail(ApiCode::Internal)
            }
            Err(err) => {
                error!(error = %err, "room query failed");
                fail(ApiCode::Internal)
            }
        }
    }
}

// Game results --------------------------------------------------------------

pub async fn game_result(
    State(ctx): Ctx,
    payload: Result<Json<GameResultCallback>, JsonRejection>,
) -> Reply {
    let body = body_or_reply!(payload);
    match ctx.ingestor.ingest(body).await {
        Ok(()) => ok_empty(),
        Err(err) => {
            error!(error = %err, "game result ingestion failed");
            fail(ApiCode::Internal)
        }
    }
}
