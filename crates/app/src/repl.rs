use crate::args::IndexArg;
use crate::render;
use clap::ValueEnum;
use cosmos_search_core::{
    Containment, DocumentContainer, EmbeddingProvider, IndexSelection, SearchMode, SearchRequest,
    SearchSession,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const EMPTY_SEARCH_HELPER: &str =
    "Enter text relating to an area of research to get started.";

const HELP: &str = "\
commands:
  index no-index|qflat|diskann   choose the container to query
  match all|any                  keyword rule for `text` searches
  vector <text>                  similarity search
  text <text>                    full text search
  rank <text>                    full text search ordered by relevance
  hybrid <text>                  vector and full text rank fusion
  show                           print the last result
  help | quit";

#[derive(Debug, PartialEq)]
pub enum Input {
    Search(SearchRequest),
    Configured,
    Show,
    Help,
    Quit,
    Blank,
}

/// Sidebar state carried between searches.
#[derive(Debug, Clone, Copy)]
pub struct SearchForm {
    pub index: IndexSelection,
    pub keyword_match: Containment,
}

impl Default for SearchForm {
    fn default() -> Self {
        Self {
            index: IndexSelection::NoIndex,
            keyword_match: Containment::All,
        }
    }
}

impl SearchForm {
    pub fn interpret(&mut self, line: &str) -> Result<Input, String> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => Ok(Input::Blank),
            "index" => {
                let selection = IndexArg::from_str(rest, true)
                    .map_err(|_| format!("unknown index {rest:?}; use no-index, qflat or diskann"))?;
                self.index = selection.into();
                Ok(Input::Configured)
            }
            "match" => {
                self.keyword_match = match rest {
                    "all" => Containment::All,
                    "any" => Containment::Any,
                    other => return Err(format!("unknown keyword rule {other:?}; use all or any")),
                };
                Ok(Input::Configured)
            }
            "vector" => self.trigger(SearchMode::Vector, rest),
            "text" => {
                let mode = match self.keyword_match {
                    Containment::All => SearchMode::FullTextAll,
                    Containment::Any => SearchMode::FullTextAny,
                };
                self.trigger(mode, rest)
            }
            "rank" => self.trigger(SearchMode::FullTextRank, rest),
            "hybrid" => self.trigger(SearchMode::Hybrid, rest),
            "show" => Ok(Input::Show),
            "help" => Ok(Input::Help),
            "quit" | "exit" => Ok(Input::Quit),
            other => Err(format!("unknown command {other:?}; type help")),
        }
    }

    /// A search trigger stays disabled until its text input is non-empty.
    fn trigger(&self, mode: SearchMode, text: &str) -> Result<Input, String> {
        if text.is_empty() {
            return Err(EMPTY_SEARCH_HELPER.to_string());
        }
        Ok(Input::Search(SearchRequest::new(mode, text, self.index)))
    }

    fn describe(&self) -> String {
        let keywords = match self.keyword_match {
            Containment::All => "all keywords",
            Containment::Any => "any keywords",
        };
        format!("index: {}, search type: {keywords}", self.index)
    }
}

/// Reads commands from stdin until `quit` or end of input. Each search is
/// awaited before the next line is read.
pub async fn run<E, C>(session: &mut SearchSession<E, C>) -> anyhow::Result<()>
where
    E: EmbeddingProvider + Send + Sync,
    C: DocumentContainer + Send + Sync,
{
    let mut form = SearchForm::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{HELP}");
    println!("{}", form.describe());

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match form.interpret(&line) {
            Ok(Input::Search(request)) => match session.submit(request).await {
                Ok(result) => print!("{}", render::report(result)),
                Err(error) => println!("{}", error.user_message()),
            },
            Ok(Input::Configured) => println!("{}", form.describe()),
            Ok(Input::Show) => match session.last_result() {
                Some(result) => print!("{}", render::report(result)),
                None => println!("{EMPTY_SEARCH_HELPER}"),
            },
            Ok(Input::Help) => println!("{HELP}"),
            Ok(Input::Quit) => break,
            Ok(Input::Blank) => {}
            Err(message) => println!("{message}"),
        }
    }

    Ok(())
}
