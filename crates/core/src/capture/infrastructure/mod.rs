pub mod ffmpeg_video_feed;
pub mod logging_device_control;
pub mod still_image_feed;
pub mod tello_device_control;
