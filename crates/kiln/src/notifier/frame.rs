use async_trait::async_trait;
use kiln_core::{Instance, InstanceId};
use serde::{Deserialize, Serialize};

use super::Result;

/// Message shown to clients when provisioning outlasts the watch
pub const TIMEOUT_MESSAGE: &str = "system is busy, please retry later";

/// One JSON frame pushed to a watching client.
///
/// `Progress` may repeat; every other variant is terminal and sent once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Done {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
        status: Option<String>,
        duration: i64,
        done: bool,
    },
    Progress {
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
        status: Option<String>,
        duration: i64,
    },
    Ready {
        #[serde(rename = "accessURL")]
        access_url: String,
        #[serde(rename = "instanceId")]
        instance_id: InstanceId,
    },
    Error {
        error: String,
    },
    Timeout {
        #[serde(rename = "timeoutError")]
        timeout_error: String,
    },
}

impl Frame {
    pub fn error(error: impl Into<String>) -> Self {
        Frame::Error {
            error: error.into(),
        }
    }

    pub fn timeout() -> Self {
        Frame::Timeout {
            timeout_error: TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn progress(instance: &Instance, duration: i64) -> Self {
        Frame::Progress {
            instance_id: instance.id.clone(),
            status: instance.detail.status.clone(),
            duration,
        }
    }

    pub fn done(instance: &Instance, duration: i64) -> Self {
        Frame::Done {
            instance_id: instance.id.clone(),
            status: instance.detail.status.clone(),
            duration,
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Progress { .. })
    }
}

/// Where frames go; a send failure means the client went away
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &Frame) -> Result<()>;
}

/// Sink collecting frames in memory
#[derive(Debug, Default)]
pub struct VecSink {
    pub frames: Vec<Frame>,
}

#[async_trait]
impl FrameSink for VecSink {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_frames_wire_names() {
        let ready = Frame::Ready {
            access_url: "https://x".to_string(),
            instance_id: InstanceId::from_string("i-1"),
        };
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({"accessURL": "https://x", "instanceId": "i-1"})
        );
        assert_eq!(
            serde_json::to_value(Frame::error("boom")).unwrap(),
            json!({"error": "boom"})
        );
        assert_eq!(
            serde_json::to_value(Frame::timeout()).unwrap(),
            json!({"timeoutError": TIMEOUT_MESSAGE})
        );
    }

    #[test]
    fn test_progress_and_done_decode_apart() {
        let progress: Frame =
            serde_json::from_value(json!({"instanceId": "i", "status": "running", "duration": 3}))
                .unwrap();
        assert!(!progress.is_terminal());

        let done: Frame = serde_json::from_value(
            json!({"instanceId": "i", "status": "completed", "duration": 9, "done": true}),
        )
        .unwrap();
        assert!(done.is_terminal());
        assert!(matches!(done, Frame::Done { duration: 9, .. }));
    }
}
