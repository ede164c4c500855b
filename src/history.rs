#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Ordered turns of one interactive session. Append-only; lives only as
/// long as the session that owns it.
#[derive(Debug, Default)]
pub struct SessionHistory {
    turns: Vec<Turn>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, content: impl Into<String>) -> &Turn {
        self.append(Role::User, content.into())
    }

    pub fn append_assistant(&mut self, content: impl Into<String>) -> &Turn {
        self.append(Role::Assistant, content.into())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    fn append(&mut self, role: Role, content: String) -> &Turn {
        self.turns.push(Turn { role, content });
        &self.turns[self.turns.len() - 1]
    }
}
