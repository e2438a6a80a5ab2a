// src/apply/cli_script.rs
//
// Offline channels that record the apply sequence as a firmware CLI paste
// script instead of talking to a device.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use crate::apply::channels::{CommandChannel, ParameterChannel, ParameterWrite, SnapshotService};
use crate::error::ChannelError;

/// Line channel and snapshot service writing into a shared script buffer.
/// Clones share the same buffer, so one script can serve as several
/// collaborators at once.
#[derive(Debug, Clone, Default)]
pub struct CliScript {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CliScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter channel that renders structured writes into this script.
    pub fn parameter_channel(&self) -> CliParameterChannel {
        CliParameterChannel {
            script: self.clone(),
        }
    }

    fn push(&self, line: String) {
        self.lines.borrow_mut().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.borrow().join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.render().as_bytes())
    }
}

impl CommandChannel for CliScript {
    fn send_line(&mut self, line: &str) -> Result<String, ChannelError> {
        self.push(line.to_string());
        Ok(String::new())
    }
}

impl SnapshotService for CliScript {
    /// Records a `diff all` so the pre-change configuration is captured when
    /// the script is pasted.
    fn create(&mut self, label: &str) -> Result<String, ChannelError> {
        self.push(format!("# snapshot: {}", label));
        self.push("diff all".to_string());
        Ok(label.to_string())
    }
}

/// Renders each parameter group as `set` lines of the owning [`CliScript`].
#[derive(Debug, Clone)]
pub struct CliParameterChannel {
    script: CliScript,
}

impl ParameterChannel for CliParameterChannel {
    fn write(&mut self, write: &ParameterWrite) -> Result<(), ChannelError> {
        self.script.push(format!("# {}", write.group));
        for (setting, value) in &write.values {
            self.script.push(format!("set {} = {}", setting, value));
        }
        Ok(())
    }
}
