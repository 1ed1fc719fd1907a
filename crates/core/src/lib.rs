//! Driver fatigue detection: frame acquisition, YOLO-style inference,
//! temporal debouncing and durable event storage.

pub mod detection {
    pub mod domain {
        pub mod decoder;
        pub mod detection;
        pub mod detection_engine;
        pub mod fatigue_detector;
        pub mod letterbox;
        pub mod model_runner;
        pub mod persistence_gate;
        pub mod suppressor;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod acquisition_loop;
    pub mod detect_image_use_case;
    pub mod pipeline_logger;
}

pub mod shared;

pub mod storage {
    pub mod domain {
        pub mod detection_store;
    }
    pub mod infrastructure {
        pub mod csv_export;
        pub mod sqlite_detection_store;
    }
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_source;
        pub mod image_file_source;
    }
}
