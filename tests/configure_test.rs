mod helpers;

use helpers::{open_coordinator, test_local, ScriptedModel};
use samsaya::session::defaults::{default_knowledge_base, DEFAULT_AGENT_NAME};
use samsaya::sync::configure::{auto_configure, populate_knowledge};

#[tokio::test(start_paused = true)]
async fn populated_sources_follow_the_existing_ones() {
    let coord = open_coordinator(test_local(), Vec::new());
    coord.update_persona("You are a mangrove ecologist.");
    let model = ScriptedModel::replying(&[]);

    let before = default_knowledge_base();
    let kb = populate_knowledge(&coord, &model).await.unwrap();

    assert_eq!(*model.prompts.lock().unwrap(), vec!["You are a mangrove ecologist.".to_string()]);
    assert_eq!(kb.project_title, "Tidal Studies");
    assert_eq!(kb.primary_sources_en.len(), before.primary_sources_en.len() + 1);
    assert_eq!(kb.primary_sources_en.last().unwrap().text, "The Hungry Tide");
    assert_eq!(kb.primary_sources_bn, before.primary_sources_bn);
    assert_eq!(kb.suggested_queries, Some(vec!["Who is Bonbibi?".to_string()]));
    assert_eq!(coord.snapshot().knowledge_base, kb);
}

#[tokio::test(start_paused = true)]
async fn failed_generation_leaves_session_untouched() {
    let coord = open_coordinator(test_local(), Vec::new());
    let model = ScriptedModel::failing();

    assert!(populate_knowledge(&coord, &model).await.is_err());
    assert!(auto_configure(&coord, &model, "river pilots").await.is_err());

    let state = coord.snapshot();
    assert_eq!(state.agent_name, DEFAULT_AGENT_NAME);
    assert_eq!(state.knowledge_base, default_knowledge_base());
    assert!(!coord.flush_pending());
}

#[tokio::test(start_paused = true)]
async fn auto_configure_adopts_name_persona_and_sources() {
    let local = test_local();
    let coord = open_coordinator(local.clone(), Vec::new());
    let model = ScriptedModel::replying(&[]);

    let state = auto_configure(&coord, &model, "tidal river ecology").await.unwrap();
    assert_eq!(state.agent_name, "Tide Scholar");
    assert_eq!(state.persona_text, "You are a guide to tidal river ecology.");
    assert_eq!(state.knowledge_base.primary_sources_en.len(), 1);
    assert!(state.knowledge_base.key_terms.contains("Bonbibi"));

    coord.flush_now().await;
    let stored = local.load_state(coord.session_id()).unwrap().unwrap();
    assert_eq!(stored.app_name.as_deref(), Some("Tide Scholar"));
}
