use pretty_assertions::assert_eq;
use serde_json::json;
use tem_core::AnnotationSession;
use tem_model::{Category, OptionId, Selection, TaxonomyLevel};
use tem_rules::{ImpactControl, RequiredField};
use tem_test_utils::{empty_record, TestSession};

async fn session_with_threat_path() -> AnnotationSession {
    let (mut session, _) = TestSession::builder().open().await;
    for code in ["TE", "TE-01", "TE-01-A"] {
        session.select_code(Category::Threat, code).unwrap();
    }
    session
}

#[tokio::test]
async fn level_one_reselect_cascades() {
    let mut session = session_with_threat_path().await;
    let outcome = session.select(Category::Threat, OptionId(4)).unwrap();

    assert_eq!(
        outcome.patch.to_json(),
        json!({
            "threat_type_l1": 4,
            "threat_type_l2": null,
            "threat_type_l3": null,
            "calculated_threat_topics": []
        })
    );
    session.teardown().await;
}

#[tokio::test]
async fn dropdowns_follow_selection() {
    let mut session = session_with_threat_path().await;
    let codes = |session: &AnnotationSession, level| {
        session
            .options_for(Category::Threat, level)
            .into_iter()
            .map(|o| o.code)
            .collect::<Vec<_>>()
    };
    assert_eq!(codes(&session, TaxonomyLevel::L1), vec!["TE", "TC"]);
    assert_eq!(codes(&session, TaxonomyLevel::L3), vec!["TE-01-A"]);

    session.clear_taxonomy(Category::Threat).unwrap();
    assert!(codes(&session, TaxonomyLevel::L2).is_empty());
    assert!(session.record().threat.deepest_selected().is_none());
    session.teardown().await;
}

#[tokio::test]
async fn topics_combine_across_categories() {
    let mut session = session_with_threat_path().await;
    session.select_code(Category::Error, "EH-01-A").unwrap();
    assert_eq!(
        session.topics().combined,
        vec!["convective weather", "decision making", "stabilized approach"]
    );
    assert_eq!(
        session.record().calculated_error_topics,
        vec!["stabilized approach", "decision making"]
    );
    session.teardown().await;
}

#[tokio::test]
async fn management_drives_impact_control() {
    let (mut session, _) = TestSession::builder().open().await;

    session
        .set_management(Category::Threat, Selection::of("managed"))
        .unwrap();
    assert_eq!(
        session.impact_control(Category::Threat),
        ImpactControl::Locked {
            value: "none".into()
        }
    );
    assert_eq!(session.record().impact_value(Category::Threat), Some("none"));

    session
        .set_management(Category::Threat, Selection::of("unmanaged"))
        .unwrap();
    assert!(!session.impact_control(Category::Threat).is_locked());
    assert_eq!(session.record().impact_value(Category::Threat), None);

    session
        .set_management(Category::Uas, Selection::of("managed"))
        .unwrap();
    assert_eq!(session.impact_control(Category::Uas), ImpactControl::Disabled);
    session.teardown().await;
}

#[tokio::test]
async fn error_impact_makes_uas_applicable_until_reverted() {
    let (mut session, _) = TestSession::builder().open().await;
    session
        .set_management(Category::Error, Selection::of("unmanaged"))
        .unwrap();
    let outcome = session
        .set_impact(Category::Error, Selection::of("leads_to_uas_e"))
        .unwrap();
    assert_eq!(
        outcome.patch.to_json(),
        json!({
            "error_impact": {"value": "leads_to_uas_e"},
            "uas_applicable": true,
            "uas_relevance": "from_error"
        })
    );

    session.select_code(Category::Uas, "UA-01-A").unwrap();
    session
        .apply_json(&json!({"uas_description": "descended below glidepath"}))
        .unwrap();

    session
        .set_impact(Category::Error, Selection::of("none"))
        .unwrap();
    let record = session.record();
    assert!(!record.uas_applicable);
    assert_eq!(record.uas_relevance, "");
    assert!(record.uas.is_blank());
    assert!(session.topics().uas.is_empty());
    session.teardown().await;
}

#[tokio::test]
async fn submission_validation_lists_missing_fields() {
    let mut session = session_with_threat_path().await;
    let err = session.validate_submission().unwrap_err();
    assert_eq!(
        err.for_category(Category::Threat).collect::<Vec<_>>(),
        vec![RequiredField::Management, RequiredField::Description]
    );

    session
        .set_management(Category::Threat, Selection::of("managed"))
        .unwrap();
    session
        .apply_json(&json!({"threat_description": "Thunderstorm on departure"}))
        .unwrap();
    assert!(session.validate_submission().is_ok());
    session.teardown().await;
}

#[tokio::test]
async fn existing_record_is_resumed() {
    let mut stored = empty_record();
    stored.id = Some(tem_model::RecordId(42));
    stored.threat.description = "from a previous visit".into();
    let (session, _) = TestSession::builder().record(stored).open().await;

    let record = session.record();
    assert_eq!(record.id, Some(tem_model::RecordId(42)));
    assert_eq!(record.threat.description, "from a previous visit");
    assert_eq!(session.status().record_id, Some(tem_model::RecordId(42)));
    session.teardown().await;
}
