pub mod http_face_client;
#[cfg(test)]
pub(crate) mod stub_http_server;
