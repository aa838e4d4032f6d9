pub mod capture {
    pub mod domain {
        pub mod capture_error;
        pub mod device_control;
        pub mod latest_frame;
        pub mod video_feed;
    }
    pub mod infrastructure;
}

pub mod coordinator {
    pub mod capture_coordinator;
    pub mod coordinator_event;
    pub mod coordinator_observer;
    pub mod interaction_state;
    pub mod local_detection_worker;
    pub mod throttle;
}

pub mod detection {
    pub mod domain {
        pub mod detected_face;
        pub mod face_detector;
        pub mod local_detector_adapter;
    }
    pub mod infrastructure;
}

pub mod geometry {
    pub mod geometry_mapper;
}

pub mod markers {
    pub mod domain {
        pub mod face_marker;
        pub mod marker_pool;
        pub mod marker_renderer;
        pub mod marker_style;
    }
    pub mod infrastructure;
}

pub mod recognition {
    pub mod domain {
        pub mod face_service;
        pub mod face_service_error;
    }
    pub mod infrastructure;
    pub mod remote_identification_client;
}

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod recognition_policy;
    pub mod rect;
    pub mod service_config;
}
