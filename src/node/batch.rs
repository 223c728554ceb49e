/// Commands accumulated on a node and executed together as one script.
///
/// The script runs in a single shell session, so directory changes,
/// exported variables and `sudo` credentials carry from one line to the
/// next. Taking the script empties the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchScript {
    commands: Vec<String>,
}

impl BatchScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command. Nothing runs until the batch is flushed.
    pub fn add(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Drops the pending commands without running them.
    pub fn clear(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }

    /// Renders the pending commands as one script and clears the batch.
    pub fn take(&mut self) -> String {
        let script = self.render();
        self.commands.clear();
        script
    }

    fn render(&self) -> String {
        self.commands
            .iter()
            .map(|c| c.trim_end_matches('\n'))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
