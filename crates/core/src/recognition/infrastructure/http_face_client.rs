use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::detection::domain::detected_face::DetectedFace;
use crate::recognition::domain::face_service::{
    apply_identification, Candidate, FaceService, IdentifyResult, PersistedFace, Person,
    TrainingStatus,
};
use crate::recognition::domain::face_service_error::FaceServiceError;
use crate::shared::constants::{FACE_API_PREFIX, SUBSCRIPTION_KEY_HEADER};
use crate::shared::rect::Rect;
use crate::shared::service_config::ServiceConfig;

const DETECT_QUERY: &str =
    "returnFaceId=true&returnFaceLandmarks=false&returnFaceAttributes=age,gender";

/// Most face ids the service accepts in one identify request.
const IDENTIFY_BATCH_LIMIT: usize = 10;

/// Face API v1.0 client over blocking HTTP.
pub struct HttpFaceClient {
    http: Client,
    base_url: String,
    subscription_key: String,
    person_group_id: String,
    confidence_threshold: f64,
    max_candidates: u32,
}

impl HttpFaceClient {
    pub fn new(config: &ServiceConfig) -> Result<Self, FaceServiceError> {
        let http = Client::builder()
            .build()
            .map_err(|e| FaceServiceError::Transport(Box::new(e)))?;
        Ok(Self {
            http,
            base_url: config.service_url.clone(),
            subscription_key: config.subscription_key.clone(),
            person_group_id: config.person_group_id.clone(),
            confidence_threshold: config.policy.identify_confidence_threshold,
            max_candidates: config.policy.max_candidates,
        })
    }

    pub fn person_group_id(&self) -> &str {
        &self.person_group_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, FACE_API_PREFIX, path)
    }

    fn group_url(&self, suffix: &str) -> String {
        self.url(&format!("persongroups/{}{}", self.person_group_id, suffix))
    }

    /// Sends `request` and returns the body when the status is accepted.
    ///
    /// Any other status becomes [`FaceServiceError::Service`] carrying the
    /// body as diagnostic, decoded as JSON where possible.
    fn send(&self, request: RequestBuilder, accepted: &[u16]) -> Result<Vec<u8>, FaceServiceError> {
        let response = request
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .send()
            .map_err(|e| FaceServiceError::Transport(Box::new(e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| FaceServiceError::Transport(Box::new(e)))?
            .to_vec();

        if accepted.contains(&status) {
            return Ok(body);
        }
        let diagnostic = serde_json::from_slice(&body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
        });
        log::debug!("Face service rejected request with HTTP {status}: {diagnostic}");
        Err(FaceServiceError::Service { status, diagnostic })
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        accepted: &[u16],
    ) -> Result<T, FaceServiceError> {
        let body = self.send(request, accepted)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn identify_batch(&self, face_ids: &[&str]) -> Result<Vec<IdentifyResult>, FaceServiceError> {
        let request = IdentifyRequest {
            person_group_id: &self.person_group_id,
            face_ids,
            max_num_of_candidates_returned: self.max_candidates,
            confidence_threshold: self.confidence_threshold,
        };
        let results: Vec<IdentifyResultDto> = self.send_json(
            self.http.post(self.url("identify")).json(&request),
            &[200],
        )?;
        Ok(results.into_iter().map(IdentifyResultDto::into_domain).collect())
    }
}

impl FaceService for HttpFaceClient {
    fn create_person_group(
        &self,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<(), FaceServiceError> {
        // 409: the group already exists
        self.send(
            self.http
                .put(self.group_url(""))
                .json(&NamedRequest { name, user_data }),
            &[200, 409],
        )?;
        Ok(())
    }

    fn create_person(&self, name: &str, user_data: Option<&str>) -> Result<Person, FaceServiceError> {
        let mut person: Person = self.send_json(
            self.http
                .post(self.group_url("/persons"))
                .json(&NamedRequest { name, user_data }),
            &[200],
        )?;
        // the create response only carries the id
        person.name.get_or_insert_with(|| name.to_string());
        if person.user_data.is_none() {
            person.user_data = user_data.map(String::from);
        }
        Ok(person)
    }

    fn get_person(&self, person_id: &str) -> Result<Person, FaceServiceError> {
        self.send_json(
            self.http.get(self.group_url(&format!("/persons/{person_id}"))),
            &[200],
        )
    }

    fn upload_face(&self, png: &[u8], person_id: &str) -> Result<PersistedFace, FaceServiceError> {
        self.send_json(
            self.http
                .post(self.group_url(&format!("/persons/{person_id}/persistedFaces")))
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(png.to_vec()),
            &[200],
        )
    }

    fn train_person_group(&self) -> Result<(), FaceServiceError> {
        self.send(self.http.post(self.group_url("/train")), &[202])?;
        Ok(())
    }

    fn training_status(&self) -> Result<TrainingStatus, FaceServiceError> {
        self.send_json(self.http.get(self.group_url("/training")), &[200])
    }

    fn detect_faces(&self, png: &[u8]) -> Result<Vec<DetectedFace>, FaceServiceError> {
        let faces: Vec<DetectedFaceDto> = self.send_json(
            self.http
                .post(format!("{}?{}", self.url("detect"), DETECT_QUERY))
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(png.to_vec()),
            &[200],
        )?;
        log::debug!("Face service detected {} face(s)", faces.len());
        Ok(faces.into_iter().map(DetectedFaceDto::into_domain).collect())
    }

    fn identify_faces(&self, faces: &[DetectedFace]) -> Result<Vec<DetectedFace>, FaceServiceError> {
        let face_ids: Vec<&str> = faces.iter().filter_map(|f| f.id.as_deref()).collect();
        if face_ids.is_empty() {
            return Ok(faces.to_vec());
        }
        let mut results = Vec::with_capacity(face_ids.len());
        for batch in face_ids.chunks(IDENTIFY_BATCH_LIMIT) {
            results.extend(self.identify_batch(batch)?);
        }
        Ok(apply_identification(faces, &results))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NamedRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_data: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyRequest<'a> {
    person_group_id: &'a str,
    face_ids: &'a [&'a str],
    max_num_of_candidates_returned: u32,
    confidence_threshold: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedFaceDto {
    face_id: String,
    face_rectangle: FaceRectangleDto,
}

#[derive(Deserialize)]
struct FaceRectangleDto {
    top: f64,
    left: f64,
    width: f64,
    height: f64,
}

impl DetectedFaceDto {
    fn into_domain(self) -> DetectedFace {
        let r = self.face_rectangle;
        DetectedFace {
            id: Some(self.face_id),
            bounding_box: Rect::new(r.left, r.top, r.width, r.height),
            identity: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyResultDto {
    face_id: String,
    #[serde(default)]
    candidates: Vec<CandidateDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateDto {
    person_id: String,
    confidence: f64,
}

impl IdentifyResultDto {
    fn into_domain(self) -> IdentifyResult {
        IdentifyResult {
            face_id: self.face_id,
            candidates: self
                .candidates
                .into_iter()
                .map(|c| Candidate {
                    person_id: c.person_id,
                    confidence: c.confidence,
                })
                .collect(),
        }
    }
}
