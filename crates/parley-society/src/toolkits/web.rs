//! Web browsing toolkit
//!
//! A page-level browser: pages are fetched over HTTP and reduced to text
//! plus a list of links. A planning model drafts a plan for the task, then
//! the web model reads one page per step and replies with a JSON action,
//! either visiting another link or answering.

use async_trait::async_trait;
use parley_abstraction::{ChatMessage, Model};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http::{fetch_text, http_client};
use super::text::{extract_json_object, extract_links, is_url, truncate};
use super::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult, Toolkit};
use crate::error::{Result, SocietyError};

const TOOL_NAME: &str = "browse_url";
const MAX_PAGE_CHARS: usize = 6_000;
const MAX_LINKS: usize = 40;

const BROWSER_SYSTEM_PROMPT: &str = "You are a web browsing agent. You see one page at a time \
as plain text with a list of links. Reply with exactly one JSON object and nothing else:\n\
{\"action\": \"visit\", \"url\": \"<absolute url>\", \"reason\": \"...\"} to open another page, or\n\
{\"action\": \"answer\", \"answer\": \"...\"} once the task can be answered from what you have read.";

/// Browser actions the web model may choose
#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowserAction {
    Visit(String),
    Answer(String),
}

impl BrowserAction {
    fn parse(reply: &str) -> Option<Self> {
        let value = extract_json_object(reply)?;
        match value["action"].as_str()? {
            "visit" => {
                let url = value["url"].as_str()?.trim();
                is_url(url).then(|| Self::Visit(url.to_string()))
            }
            "answer" => value["answer"].as_str().map(|a| Self::Answer(a.to_string())),
            _ => None,
        }
    }
}

/// Toolkit exposing `browse_url`
#[derive(Clone)]
pub struct WebToolkit {
    web_model: Arc<dyn Model>,
    planning_model: Arc<dyn Model>,
    max_steps: usize,
    client: Client,
}

impl WebToolkit {
    /// Browse with `web_model`, planning with `planning_model`, for at most
    /// `max_steps` page visits per call.
    pub fn new(web_model: Arc<dyn Model>, planning_model: Arc<dyn Model>, max_steps: usize) -> Result<Self> {
        if max_steps == 0 {
            return Err(SocietyError::Configuration("Web browsing needs at least one step".to_string()));
        }
        Ok(Self { web_model, planning_model, max_steps, client: http_client(Duration::from_secs(30))? })
    }
}

impl std::fmt::Debug for WebToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebToolkit")
            .field("web_model", &self.web_model.model_id())
            .field("planning_model", &self.planning_model.model_id())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

impl Toolkit for WebToolkit {
    fn name(&self) -> &'static str {
        "web"
    }

    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(
            TOOL_NAME,
            "Browse the web starting from a URL to accomplish a task that needs several pages \
             (navigating listings, following links, reading product pages). Returns the answer \
             found and the pages visited.",
            ToolParameters::new()
                .add_property("task_prompt", "string", "What to find out or accomplish", true)
                .add_property("start_url", "string", "The absolute URL to start from", true),
            Arc::new(BrowseHandler { toolkit: self.clone() }),
        )]
    }
}

struct BrowseHandler {
    toolkit: WebToolkit,
}

impl BrowseHandler {
    async fn plan(&self, task: &str, start_url: &str) -> Result<String> {
        let prompt = format!(
            "Draft a short plan (at most 5 numbered steps) for completing this web task.\n\
             Task: {}\nStarting page: {}\nOnly output the plan.",
            task, start_url
        );
        let response = self.toolkit.planning_model.generate_text(&prompt, None).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl ToolHandler for BrowseHandler {
    async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
        let task = args.require_string("task_prompt")?;
        let start_url = args.require_string("start_url")?;
        if !is_url(&start_url) {
            return Err(SocietyError::invalid_args(TOOL_NAME, "start_url must be an http(s) URL"));
        }

        let plan = self.plan(&task, &start_url).await?;
        info!(start_url = %start_url, "Browsing");
        debug!("Browsing plan:\n{}", plan);

        let mut messages = vec![
            ChatMessage::system(BROWSER_SYSTEM_PROMPT),
            ChatMessage::user(format!("Task: {}\n\nPlan:\n{}", task, plan)),
        ];
        let mut current_url = start_url;
        let mut visited: Vec<String> = Vec::new();

        for step in 1..=self.toolkit.max_steps {
            visited.push(current_url.clone());
            let observation = match fetch_text(&self.toolkit.client, &current_url, TOOL_NAME).await {
                Ok((text, body)) => {
                    let links = extract_links(&current_url, &body, MAX_LINKS);
                    format!(
                        "Step {}/{}. Current page: {}\n\nPage text:\n{}\n\nLinks:\n{}",
                        step,
                        self.toolkit.max_steps,
                        current_url,
                        truncate(&text, MAX_PAGE_CHARS),
                        if links.is_empty() { "(none)".to_string() } else { links.join("\n") }
                    )
                }
                Err(e) => {
                    warn!(url = %current_url, error = %e, "Page fetch failed");
                    format!(
                        "Step {}/{}. Opening {} failed: {}. Choose another page or answer.",
                        step, self.toolkit.max_steps, current_url, e
                    )
                }
            };
            messages.push(ChatMessage::user(observation));

            let reply = self.toolkit.web_model.generate_chat_completion(&messages, None).await?;
            messages.push(ChatMessage::assistant(reply.content.clone()));

            match BrowserAction::parse(&reply.content) {
                Some(BrowserAction::Answer(answer)) => {
                    debug!(steps = step, "Browsing finished with an answer");
                    return Ok(ToolResult::success(format!(
                        "{}\n\nVisited pages:\n{}",
                        answer,
                        visited.join("\n")
                    ))
                    .with_metadata("steps", step.to_string()));
                }
                Some(BrowserAction::Visit(url)) => current_url = url,
                None => {
                    messages.push(ChatMessage::user(
                        "Your reply was not a valid action. Reply with a single JSON object \
                         using action \"visit\" (with an absolute url) or \"answer\".",
                    ));
                }
            }
        }

        Ok(ToolResult::error(format!(
            "Browsing stopped after {} steps without an answer.\n\nVisited pages:\n{}",
            self.toolkit.max_steps,
            visited.join("\n")
        ))
        .with_metadata("steps", self.toolkit.max_steps.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_models::ScriptedModel;
    use serde_json::json;

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            BrowserAction::parse(r#"{"action": "visit", "url": "https://shop.example/item/1"}"#),
            Some(BrowserAction::Visit("https://shop.example/item/1".to_string()))
        );
        assert_eq!(
            BrowserAction::parse("```json\n{\"action\": \"answer\", \"answer\": \"42\"}\n```"),
            Some(BrowserAction::Answer("42".to_string()))
        );
        assert_eq!(BrowserAction::parse(r#"{"action": "visit", "url": "/relative"}"#), None);
        assert_eq!(BrowserAction::parse("I will click the button"), None);
    }

    #[tokio::test]
    async fn test_browse_follows_links_until_answer() {
        let mut server = mockito::Server::new_async().await;
        let item_url = format!("{}/item/7", server.url());
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(format!(r#"<html><body><a href="{}">Mechanical keyboard</a></body></html>"#, item_url))
            .create_async()
            .await;
        server
            .mock("GET", "/item/7")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><h1>Mechanical keyboard</h1><p>$89.99</p></body></html>")
            .create_async()
            .await;

        let planner = Arc::new(ScriptedModel::new("planner"));
        planner.push_text("1. Open the listing\n2. Open the product");
        let browser = Arc::new(ScriptedModel::new("browser"));
        browser.push_text(json!({"action": "visit", "url": item_url}).to_string());
        browser.push_text(r#"{"action": "answer", "answer": "Mechanical keyboard, $89.99"}"#);

        let tool = WebToolkit::new(browser.clone(), planner.clone(), 5).unwrap().tools().remove(0);
        let result = tool
            .execute(&ToolArguments::new(
                TOOL_NAME,
                json!({"task_prompt": "Find a keyboard and its price", "start_url": format!("{}/", server.url())}),
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.starts_with("Mechanical keyboard, $89.99"));
        assert!(result.output.contains(&item_url));
        assert_eq!(result.metadata.get("steps"), Some(&"2".to_string()));
        assert_eq!(planner.call_count(), 1);

        let second_request = &browser.requests()[1];
        let last_page = &second_request.last().unwrap().content;
        assert!(last_page.contains("$89.99"));
    }

    #[tokio::test]
    async fn test_relative_links_are_offered_as_absolute_urls() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/s/list")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<html><body><a href="/dp/B0KEYBOARD">Keyboard</a><a href="item/2">Mouse</a></body></html>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/dp/B0KEYBOARD")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><h1>Keyboard</h1><p>$59.00</p></body></html>")
            .create_async()
            .await;

        let keyboard_url = format!("{}/dp/B0KEYBOARD", server.url());
        let planner = Arc::new(ScriptedModel::new("planner"));
        planner.push_text("1. Open the keyboard");
        let browser = Arc::new(ScriptedModel::new("browser"));
        browser.push_text(json!({"action": "visit", "url": keyboard_url}).to_string());
        browser.push_text(r#"{"action": "answer", "answer": "Keyboard, $59.00"}"#);

        let tool = WebToolkit::new(browser.clone(), planner, 3).unwrap().tools().remove(0);
        let result = tool
            .execute(&ToolArguments::new(
                TOOL_NAME,
                json!({"task_prompt": "Price of the keyboard", "start_url": format!("{}/s/list", server.url())}),
            ))
            .await
            .unwrap();

        assert!(result.success);
        let requests = browser.requests();
        let first_page = &requests[0].last().unwrap().content;
        assert!(first_page.contains(&keyboard_url));
        assert!(first_page.contains(&format!("{}/s/item/2", server.url())));
        assert!(!first_page.contains("(none)"));
    }

    #[tokio::test]
    async fn test_browse_gives_up_after_max_steps() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/").with_status(200).with_body("<p>nothing here</p>").create_async().await;

        let planner = Arc::new(ScriptedModel::new("planner"));
        planner.push_text("1. Look around");
        let browser = Arc::new(ScriptedModel::new("browser"));
        browser.push_text("not json");
        browser.push_text("still not json");

        let tool = WebToolkit::new(browser, planner, 2).unwrap().tools().remove(0);
        let result = tool
            .execute(&ToolArguments::new(
                TOOL_NAME,
                json!({"task_prompt": "Find something", "start_url": format!("{}/", server.url())}),
            ))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.starts_with("Browsing stopped after 2 steps"));
    }

    #[test]
    fn test_zero_steps_is_rejected() {
        let model = Arc::new(ScriptedModel::new("m"));
        assert!(WebToolkit::new(model.clone(), model, 0).unwrap_err().is_configuration());
    }
}
