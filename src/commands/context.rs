//! Handlers for `tokenwright context ...`.

use colored::Colorize;

use super::{read_input, Runtime};
use crate::cli::{ContextCommand, OutputFormat};
use crate::conversation::{Context, ConversationStore, NewContext, Role};
use crate::error::{Result, TokenwrightError};
use crate::output::{self, FormatOptions, Report};

pub fn run(runtime: &Runtime, command: ContextCommand) -> Result<()> {
    let store = runtime.conversations()?;
    match command {
        ContextCommand::Create {
            session,
            conversation,
            system,
            document,
            user,
        } => {
            let mut new = NewContext::new(session);
            new.conversation_id = conversation;
            new.system_message = system;
            new.user_id = user;
            if let Some(path) = document {
                new.document_content = Some(read_input(Some(path.as_path()))?);
            }
            let context = store.create(new)?;
            println!("{}", context.conversation_id);
            status(runtime, "created", &context);
            Ok(())
        }
        ContextCommand::Add {
            session,
            conversation,
            role,
            content,
        } => {
            let role = Role::parse(&role).ok_or_else(|| {
                TokenwrightError::validation("role", format!("unknown role '{role}'"))
            })?;
            let context = store.append_message(&session, &conversation, role, &content)?;
            status(runtime, "added", &context);
            Ok(())
        }
        ContextCommand::Document {
            session,
            conversation,
            input,
            clear,
        } => {
            let document = if clear {
                None
            } else {
                Some(read_input(input.as_deref())?)
            };
            let context = store.set_document(&session, &conversation, document)?;
            status(runtime, "document", &context);
            Ok(())
        }
        ContextCommand::Show {
            session,
            conversation,
            format,
        } => {
            let context = require(&store, &session, &conversation)?;
            show(&store, &context, format)
        }
        ContextCommand::Prepare {
            session,
            conversation,
            max_tokens,
            format,
        } => {
            let context = require(&store, &session, &conversation)?;
            let max_tokens = max_tokens.unwrap_or(store.config().max_tokens);
            let messages = store.prepare_for_model(&context, max_tokens);

            let mut report = Report::new("Model messages").field("max tokens", max_tokens);
            for message in &messages {
                report = report.section(message.role.as_str(), message.content.as_str());
            }
            let report = report.data(&messages)?;
            output::write_report(
                &report,
                &FormatOptions {
                    format: format.into(),
                    out: None,
                },
            )
        }
        ContextCommand::Trim {
            session,
            conversation,
            max_tokens,
        } => {
            let max_tokens = max_tokens.unwrap_or(store.config().max_tokens);
            let context = store.trim_stored(&session, &conversation, max_tokens)?;
            status(runtime, "trimmed", &context);
            Ok(())
        }
        ContextCommand::Clear {
            session,
            conversation,
        } => {
            if store.clear(&session, &conversation)? {
                if !runtime.quiet {
                    eprintln!("{} {session}/{conversation}", "cleared".green().bold());
                }
                Ok(())
            } else {
                Err(TokenwrightError::context_not_found(session, conversation))
            }
        }
    }
}

fn require(store: &ConversationStore, session: &str, conversation: &str) -> Result<Context> {
    store
        .get(session, conversation)?
        .ok_or_else(|| TokenwrightError::context_not_found(session, conversation))
}

fn show(store: &ConversationStore, context: &Context, format: OutputFormat) -> Result<()> {
    let summary = store.summary(context);
    let mut report = Report::new(format!(
        "Conversation {}/{}",
        summary.session_id, summary.conversation_id
    ))
    .field("messages", summary.message_count)
    .field("token usage (weighted)", summary.token_usage)
    .field("raw tokens", summary.raw_tokens)
    .field("document tokens", summary.document_tokens)
    .field("version", summary.version)
    .field("updated", summary.updated_at.to_rfc3339());
    for (i, message) in context.messages.iter().enumerate() {
        report = report.section(format!("{i}: {}", message.role), message.content.as_str());
    }
    let report = report.data(context)?;
    output::write_report(
        &report,
        &FormatOptions {
            format: format.into(),
            out: None,
        },
    )
}

fn status(runtime: &Runtime, action: &str, context: &Context) {
    if runtime.quiet {
        return;
    }
    eprintln!(
        "{} {}/{}: {} message{}, {} weighted tokens",
        action.green().bold(),
        context.session_id,
        context.conversation_id,
        context.metadata.message_count,
        if context.metadata.message_count == 1 { "" } else { "s" },
        context.metadata.token_usage
    );
}
