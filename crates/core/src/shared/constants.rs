pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";
pub const BLAZEFACE_MODEL_URL: &str =
    "https://github.com/facespotter/facespotter/releases/download/v0.1.0/blazeface_short_range.onnx";

/// Application directory under the platform config/cache roots.
pub const APP_DIR_NAME: &str = "FaceSpotter";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Face service API version prefix.
pub const FACE_API_PREFIX: &str = "face/v1.0";
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
