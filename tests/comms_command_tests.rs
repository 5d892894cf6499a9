use adcp_pipeline::comms::{send_command, CommandPort};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::Duration;

/// Scripted port: each attempt either replies, replies too late, or fails.
enum Attempt {
    Reply(&'static str),
    Slow,
    SendError,
}

struct ScriptedPort {
    script: Vec<Attempt>,
    attempt: usize,
    sends: usize,
}

impl ScriptedPort {
    fn new(script: Vec<Attempt>) -> Self {
        Self { script, attempt: 0, sends: 0 }
    }
}

#[async_trait]
impl CommandPort for ScriptedPort {
    async fn send(&mut self, _command: &str) -> Result<()> {
        self.sends += 1;
        match self.script.get(self.attempt) {
            Some(Attempt::SendError) => {
                self.attempt += 1;
                Err(anyhow!("serial port write failed"))
            }
            _ => Ok(()),
        }
    }

    async fn read_reply(&mut self) -> Result<String> {
        let current = self.attempt;
        self.attempt += 1;
        match self.script.get(current) {
            Some(Attempt::Reply(reply)) => Ok(reply.to_string()),
            Some(Attempt::Slow) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            }
            _ => Err(anyhow!("no reply scripted")),
        }
    }
}

#[tokio::test]
async fn reply_within_timeout_succeeds_first_try() {
    let mut port = ScriptedPort::new(vec![Attempt::Reply("CSHOW OK")]);
    let reply = send_command(&mut port, "CSHOW", Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(reply, "CSHOW OK");
    assert_eq!(port.sends, 1);
}

#[tokio::test]
async fn timeout_triggers_a_single_retry() {
    let mut port = ScriptedPort::new(vec![Attempt::Slow, Attempt::Reply("START OK")]);
    let reply = send_command(&mut port, "START", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(reply, "START OK");
    // Original attempt plus exactly one retry.
    assert_eq!(port.sends, 2);
}

#[tokio::test]
async fn failure_after_retry_is_returned_to_caller() {
    let mut port = ScriptedPort::new(vec![Attempt::Slow, Attempt::Slow]);
    let result = send_command(&mut port, "STOP", Duration::from_millis(50)).await;
    assert!(result.is_err());
    assert_eq!(port.sends, 2);
}

#[tokio::test]
async fn send_error_also_counts_as_an_attempt() {
    let mut port = ScriptedPort::new(vec![Attempt::SendError, Attempt::Reply("OK")]);
    let reply = send_command(&mut port, "BREAK", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(reply, "OK");
    assert_eq!(port.sends, 2);
}
