//! Startup bootstrap: declarative games, AI personas, and room definitions
//! are upserted into the store, then AIs sharing a `room_id` are grouped
//! (master first, slaves by `slave_number`) to open one personal room per
//! master plus the operator-hosted rooms.

use crate::room::layout::LayoutOverrides;
use crate::store::types::unix_ts;
use crate::store::{
    GatewayStore, InstalledAiPlayer, InstalledGame, InstalledRoom, RoomAssistant,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct GameDef {
    pub index: String,
    pub en_name: String,
    pub zh_name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub slogan: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub min_online_user_cnt: i64,
    pub max_online_user_cnt: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiPlayerDef {
    pub id: String,
    pub room_id: String,
    pub is_master: bool,
    #[serde(default)]
    pub slave_number: i32,
    pub nickname: String,
    #[serde(default)]
    pub gender: i32,
    #[serde(default)]
    pub age: i32,
    #[serde(default)]
    pub avatar: String,
    pub game_index: String,
    #[serde(default)]
    pub self_text_intro: String,
    #[serde(default)]
    pub character_tags: Vec<String>,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub hobby_tags: Vec<String>,
    #[serde(default)]
    pub game_tags: Vec<String>,
    #[serde(default)]
    pub be_hosting: bool,
    #[serde(default = "default_installed")]
    pub installed: bool,
    #[serde(default)]
    pub be_hosting_room_id: Option<String>,
}

fn default_installed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomDef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub carrying_capacity: i64,
    pub queue_symbol: String,
    pub ai_player_cnt: i64,
    #[serde(default)]
    pub rank_weight: i64,
    #[serde(default)]
    pub be_hosting: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameRoomGroup {
    pub game_index: String,
    #[serde(default)]
    pub platform_announcement: String,
    #[serde(default)]
    pub room_rule_title: String,
    #[serde(default)]
    pub room_rule: String,
    pub rooms_information: Vec<RoomDef>,
}

/// The declarative business configuration applied at startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BusinessConf {
    #[serde(default)]
    pub game_list: Vec<GameDef>,
    #[serde(default)]
    pub ai_player_list: Vec<AiPlayerDef>,
    #[serde(default)]
    pub game_room_list: Vec<GameRoomGroup>,
    #[serde(default)]
    pub layout_overrides: LayoutOverrides,
}

impl BusinessConf {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading business conf {}", path.as_ref().display()))?;
        serde_json::from_str(&raw).context("parsing business conf")
    }
}

/// A room definition joined with its group-level rule fields.
#[derive(Debug, Clone)]
struct RoomTemplate {
    def: RoomDef,
    game_index: String,
    rule_title: String,
    rule_content: String,
    announcement: String,
}

/// Group AIs by shared `room_id`: master first, then slaves ordered by
/// `slave_number`. Groups come out sorted by room id.
fn group_by_room(mut ai_players: Vec<AiPlayerDef>) -> Vec<Vec<AiPlayerDef>> {
    ai_players.sort_by(|a, b| {
        a.room_id
            .cmp(&b.room_id)
            .then(b.is_master.cmp(&a.is_master))
            .then(a.slave_number.cmp(&b.slave_number))
    });
    let mut groups: Vec<Vec<AiPlayerDef>> = Vec::new();
    for ai in ai_players {
        match groups.last_mut() {
            Some(group) if group[0].room_id == ai.room_id => group.push(ai),
            _ => groups.push(vec![ai]),
        }
    }
    groups
}

fn room_from_template(template: &RoomTemplate, master: &AiPlayerDef) -> InstalledRoom {
    InstalledRoom {
        id: master.room_id.clone(),
        game_index: template.game_index.clone(),
        rule_title: template.rule_title.clone(),
        rule_content: template.rule_content.clone(),
        title: template.def.title.clone(),
        cover: master.avatar.clone(),
        announcement: template.announcement.clone(),
        tags: template.def.tags.clone(),
        owner_id: master.id.clone(),
        owner_nickname: master.nickname.clone(),
        owner_gender: master.gender,
        owner_avatar: master.avatar.clone(),
        assistants: Vec::new(),
        carrying_capacity: template.def.carrying_capacity,
        queue_symbol: template.def.queue_symbol.clone(),
        ai_player_cnt: template.def.ai_player_cnt,
        rank_weight: template.def.rank_weight,
        be_hosting: template.def.be_hosting,
        online_user_cnt: 0,
        in_game_queue_user_cnt: 0,
        in_game_queue_be_ready_user_cnt: 0,
        in_game_battle_user_cnt: 0,
        update_ts: 0,
    }
}

async fn install_group(
    store: &dyn GatewayStore,
    template: &RoomTemplate,
    group: &[AiPlayerDef],
) -> Result<()> {
    let master = &group[0];
    store
        .upsert_room_master(room_from_template(template, master))
        .await?;
    for slave in group.iter().skip(1) {
        store
            .add_room_assistant(
                &master.room_id,
                RoomAssistant {
                    assistant_id: slave.id.clone(),
                    assistant_nickname: slave.nickname.clone(),
                    assistant_gender: slave.gender,
                    assistant_avatar: slave.avatar.clone(),
                },
            )
            .await?;
    }
    Ok(())
}

/// Apply the declarative configuration to the store.
pub async fn bootstrap(store: &dyn GatewayStore, conf: &BusinessConf) -> Result<()> {
    let now = unix_ts();

    for game in &conf.game_list {
        store
            .upsert_game(InstalledGame {
                index: game.index.clone(),
                en_name: game.en_name.clone(),
                zh_name: game.zh_name.clone(),
                logo: game.logo.clone(),
                slogan: game.slogan.clone(),
                tags: game.tags.clone(),
                min_online_user_cnt: game.min_online_user_cnt,
                max_online_user_cnt: game.max_online_user_cnt,
                update_ts: now,
            })
            .await?;
    }
    info!(games = conf.game_list.len(), "installed game definitions");

    let mut owner_candidates: BTreeMap<String, Vec<AiPlayerDef>> = BTreeMap::new();
    let mut hosting_candidates: BTreeMap<String, Vec<AiPlayerDef>> = BTreeMap::new();
    for ai in &conf.ai_player_list {
        let mut tags = vec![ai.game_index.clone(), ai.age.to_string()];
        tags.extend(ai.character_tags.iter().cloned());
        tags.push(ai.occupation.clone());
        tags.extend(ai.hobby_tags.iter().cloned());
        tags.extend(ai.game_tags.iter().cloned());

        store
            .upsert_ai_player(InstalledAiPlayer {
                id: ai.id.clone(),
                room_id: ai.room_id.clone(),
                is_master: ai.is_master,
                slave_number: ai.slave_number,
                nickname: ai.nickname.clone(),
                gender: ai.gender,
                age: ai.age,
                avatar: ai.avatar.clone(),
                game_index: ai.game_index.clone(),
                self_text_intro: ai.self_text_intro.clone(),
                tags,
                state: 0,
                be_hosting: ai.be_hosting,
                installed: ai.installed,
                be_hosting_room_id: ai.be_hosting_room_id.clone(),
                update_ts: now,
            })
            .await?;

        if !ai.installed {
            continue;
        }
        if ai.be_hosting {
            hosting_candidates
                .entry(ai.game_index.clone())
                .or_default()
                .push(ai.clone());
        } else {
            owner_candidates
                .entry(ai.game_index.clone())
                .or_default()
                .push(ai.clone());
        }
    }
    info!(
        ai_players = conf.ai_player_list.len(),
        "installed AI personas"
    );

    let mut personal_templates: BTreeMap<String, Vec<RoomTemplate>> = BTreeMap::new();
    let mut hosted_templates: BTreeMap<String, Vec<RoomTemplate>> = BTreeMap::new();
    for group in &conf.game_room_list {
        for def in &group.rooms_information {
            let template = RoomTemplate {
                def: def.clone(),
                game_index: group.game_index.clone(),
                rule_title: group.room_rule_title.clone(),
                rule_content: group.room_rule.clone(),
                announcement: group.platform_announcement.clone(),
            };
            let bucket = if def.be_hosting {
                &mut hosted_templates
            } else {
                &mut personal_templates
            };
            bucket
                .entry(group.game_index.clone())
                .or_default()
                .push(template);
        }
    }

    // One personal room per master AI, cycling through the game's room
    // definitions when masters outnumber them.
    for (game_index, candidates) in owner_candidates {
        let Some(templates) = personal_templates.get(&game_index) else {
            warn!(game_index, "no room definitions for game, skipping its AIs");
            continue;
        };
        for (i, group) in group_by_room(candidates).iter().enumerate() {
            if !group[0].is_master {
                warn!(room_id = %group[0].room_id, "room group without master AI, skipped");
                continue;
            }
            let template = &templates[i % templates.len()];
            install_group(store, template, group).await?;
        }
    }

    // Hosted rooms bind to the definition named by the master's
    // `be_hosting_room_id`.
    for (game_index, candidates) in hosting_candidates {
        let templates = hosted_templates.get(&game_index).cloned().unwrap_or_default();
        for group in group_by_room(candidates) {
            if !group[0].is_master {
                warn!(room_id = %group[0].room_id, "hosted group without master AI, skipped");
                continue;
            }
            let wanted = group[0].be_hosting_room_id.clone().unwrap_or_default();
            let Some(template) = templates.iter().find(|t| t.def.id == wanted) else {
                warn!(
                    room_id = %group[0].room_id,
                    be_hosting_room_id = %wanted,
                    "no hosted room definition matches, skipped"
                );
                continue;
            };
            install_group(store, template, &group).await?;
        }
    }

    info!("installed room definitions");
    Ok(())
}
