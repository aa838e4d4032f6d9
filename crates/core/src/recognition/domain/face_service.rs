use serde::Deserialize;

use crate::detection::domain::detected_face::{DetectedFace, Identity};
use crate::recognition::domain::face_service_error::FaceServiceError;

/// A person enrolled in the configured person group.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub persisted_face_ids: Vec<String>,
}

/// Acknowledgement of an uploaded training face.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFace {
    pub persisted_face_id: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrainingState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    pub status: TrainingState,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_action_date_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One identify verdict: candidates for a single face id.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentifyResult {
    pub face_id: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub person_id: String,
    pub confidence: f64,
}

/// Blocking contract of the cloud face service.
///
/// The person group is fixed per implementation. Every call is a single
/// request/response and completes exactly once.
pub trait FaceService: Send + Sync {
    /// Succeeds also when the group already exists.
    fn create_person_group(&self, name: &str, user_data: Option<&str>)
        -> Result<(), FaceServiceError>;

    fn create_person(&self, name: &str, user_data: Option<&str>)
        -> Result<Person, FaceServiceError>;

    fn get_person(&self, person_id: &str) -> Result<Person, FaceServiceError>;

    /// Registers `png` as a training sample for the person.
    fn upload_face(&self, png: &[u8], person_id: &str) -> Result<PersistedFace, FaceServiceError>;

    /// Starts server-side training; does not wait for it to finish.
    fn train_person_group(&self) -> Result<(), FaceServiceError>;

    fn training_status(&self) -> Result<TrainingStatus, FaceServiceError>;

    /// Faces with their per-call ids; no identities.
    fn detect_faces(&self, png: &[u8]) -> Result<Vec<DetectedFace>, FaceServiceError>;

    /// Returns `faces` with identities filled in where the service matched.
    fn identify_faces(&self, faces: &[DetectedFace]) -> Result<Vec<DetectedFace>, FaceServiceError>;
}

/// Merges identify verdicts into `faces` by face id.
///
/// The best candidate wins. Faces without an id, without a verdict or with
/// no candidates keep their current identity.
pub fn apply_identification(faces: &[DetectedFace], results: &[IdentifyResult]) -> Vec<DetectedFace> {
    faces
        .iter()
        .map(|face| {
            let mut face = face.clone();
            let best = face.id.as_deref().and_then(|id| {
                results
                    .iter()
                    .filter(|r| r.face_id == id)
                    .flat_map(|r| r.candidates.iter())
                    .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            });
            if let Some(candidate) = best {
                face.identity = Some(Identity {
                    person_id: candidate.person_id.clone(),
                    confidence: candidate.confidence,
                    name: None,
                });
            }
            face
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::rect::Rect;

    fn remote(id: &str) -> DetectedFace {
        DetectedFace {
            id: Some(id.into()),
            bounding_box: Rect::new(1.0, 2.0, 3.0, 4.0),
            identity: None,
        }
    }

    fn verdict(face_id: &str, candidates: &[(&str, f64)]) -> IdentifyResult {
        IdentifyResult {
            face_id: face_id.into(),
            candidates: candidates
                .iter()
                .map(|(p, c)| Candidate {
                    person_id: (*p).into(),
                    confidence: *c,
                })
                .collect(),
        }
    }

    #[test]
    fn test_identities_assigned_by_face_id() {
        let faces = vec![remote("a"), remote("b"), remote("c")];
        let results = vec![
            verdict("c", &[("p-c", 0.91)]),
            verdict("a", &[("p-a", 0.72)]),
            verdict("b", &[]),
        ];
        let merged = apply_identification(&faces, &results);

        assert_eq!(merged[0].identity.as_ref().unwrap().person_id, "p-a");
        assert!(merged[1].identity.is_none());
        assert_eq!(merged[2].identity.as_ref().unwrap().person_id, "p-c");
        assert_eq!(merged[2].identity.as_ref().unwrap().confidence, 0.91);
        assert_eq!(merged[0].bounding_box, faces[0].bounding_box);
    }

    #[test]
    fn test_unmatched_and_local_faces_untouched() {
        let mut local = remote("x");
        local.id = None;
        let faces = vec![local.clone(), remote("y")];
        let merged = apply_identification(&faces, &[verdict("zzz", &[("p", 0.9)])]);
        assert_eq!(merged, faces);
    }

    #[test]
    fn test_best_candidate_wins() {
        let merged = apply_identification(
            &[remote("a")],
            &[verdict("a", &[("low", 0.71), ("high", 0.95)])],
        );
        assert_eq!(merged[0].identity.as_ref().unwrap().person_id, "high");
    }

    #[test]
    fn test_training_status_decodes_service_json() {
        let json = r#"{"status":"running","createdDateTime":"2017-03-06T14:28:00Z","lastActionDateTime":null,"message":null}"#;
        let status: TrainingStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.status, TrainingState::Running);
        assert_eq!(status.created_date_time.as_deref(), Some("2017-03-06T14:28:00Z"));
        assert!(status.message.is_none());

        let status: TrainingStatus = serde_json::from_str(r#"{"status":"notstarted"}"#).unwrap();
        assert_eq!(status.status, TrainingState::NotStarted);
    }

    #[test]
    fn test_person_decodes_minimal_and_full() {
        let p: Person = serde_json::from_str(r#"{"personId":"25985303-c537-4467-b41d-bdb45cd95ca1"}"#).unwrap();
        assert!(p.name.is_none());
        let p: Person = serde_json::from_str(
            r#"{"personId":"p1","name":"Ada","userData":"pilot","persistedFaceIds":["f1","f2"]}"#,
        )
        .unwrap();
        assert_eq!(p.name.as_deref(), Some("Ada"));
        assert_eq!(p.persisted_face_ids.len(), 2);
    }
}
