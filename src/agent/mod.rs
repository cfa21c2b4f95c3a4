// Conversational agent session: a tool registry with the retrieval pipeline
// as the only registered tool, a scripted greeting, and a turn loop. Errors
// from the tool become user-facing text here, at the outermost boundary.


use std::io::{BufRead, Write};

use tracing::{error, info};

use crate::Result;
use crate::config::Config;
use crate::rag::RagEngine;

pub const AGENT_INSTRUCTIONS: &str = "You are an intelligent AI assistant with access to documents and research papers. \
Answer questions about machine learning, deep learning, and AI concepts using the knowledge base, \
cite sources when possible, and suggest a different question when nothing relevant is found.";

pub const GREETING: &str = "Hello! I can answer questions about the documents in my knowledge base, \
including machine learning, deep learning, and AI concepts. What would you like to know?";

/// A capability the session can invoke with a free-text query.
pub trait ToolHandler {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn call(&self, query: &str) -> Result<String>;
}

/// The retrieval pipeline exposed as a callable tool.
pub struct RagToolHandler {
    engine: RagEngine,
}

impl RagToolHandler {
    #[inline]
    pub fn new(engine: RagEngine) -> Self {
        Self { engine }
    }
}

impl ToolHandler for RagToolHandler {
    #[inline]
    fn name(&self) -> &str {
        "rag"
    }

    #[inline]
    fn description(&self) -> &str {
        "Answer questions using retrieval over the document knowledge base"
    }

    #[inline]
    fn call(&self, query: &str) -> Result<String> {
        info!("RAG query: {query}");
        self.engine.answer(query)
    }
}

/// Turn-based session delegating every user turn to its registered tool.
pub struct AgentSession {
    instructions: String,
    tools: Vec<Box<dyn ToolHandler>>,
}

impl AgentSession {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let engine = RagEngine::new(config)?;
        let mut session = Self::with_instructions(AGENT_INSTRUCTIONS);
        session.register_tool(Box::new(RagToolHandler::new(engine)));
        Ok(session)
    }

    #[inline]
    pub fn with_instructions(instructions: &str) -> Self {
        Self {
            instructions: instructions.to_string(),
            tools: Vec::new(),
        }
    }

    #[inline]
    pub fn register_tool(&mut self, tool: Box<dyn ToolHandler>) {
        info!("Registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    #[inline]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    #[inline]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    #[inline]
    pub fn greeting(&self) -> &'static str {
        GREETING
    }

    /// Run one user turn through the first registered tool. Tool failures
    /// become a user-facing sentence; the session never propagates them.
    #[inline]
    pub fn handle_turn(&self, input: &str) -> String {
        let Some(tool) = self.tools.first() else {
            return "I don't have any tools registered to answer that.".to_string();
        };

        match tool.call(input) {
            Ok(answer) => answer,
            Err(e) => {
                error!("Tool {} failed: {e}", tool.name());
                format!("I encountered an error while searching the knowledge base: {e}")
            }
        }
    }

    /// Interactive loop: greet, then answer turns until EOF or an exit
    /// command.
    #[inline]
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<()> {
        writeln!(output, "{}", self.greeting())?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                break;
            }
            writeln!(output, "{}", self.handle_turn(line))?;
        }

        Ok(())
    }
}
