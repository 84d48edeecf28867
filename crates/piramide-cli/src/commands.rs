use piramide_types::models::{ClassTag, PostId, Theme, VoteState};

pub const HELP: &str = "\
comandos:
  feed                    lista o mural
  post <texto>            publica (pede a classe se nenhuma foi escolhida)
  reply <id> <texto>      responde a um post
  classe <base|meio|topo> escolhe a classe
  cancelar                fecha o seletor de classe
  replies <id>            mostra as respostas de um post
  vote <id> <+1|-1>       vota (repetir o mesmo voto desfaz)
  report <id> [motivo]    denuncia um post
  trending                tags em alta
  status                  estado do servidor
  theme [light|dark]      mostra ou troca o tema
  quit                    sai";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Feed,
    Post(String),
    Reply { post_id: PostId, text: String },
    Class(ClassTag),
    Cancel,
    Replies(PostId),
    Vote { post_id: PostId, choice: VoteState },
    Report { post_id: PostId, reason: Option<String> },
    Trending,
    Status,
    /// `None` toggles.
    Theme(Option<Theme>),
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "feed" => Command::Feed,
        "post" => Command::Post(rest.to_string()),
        "reply" => {
            let (id, text) = split_id(rest)?;
            Command::Reply {
                post_id: id,
                text: text.to_string(),
            }
        }
        "classe" | "class" => Command::Class(rest.parse().map_err(|e| format!("{}", e))?),
        "cancelar" | "cancel" => Command::Cancel,
        "replies" => Command::Replies(split_id(rest)?.0),
        "vote" => {
            let (id, arg) = split_id(rest)?;
            let choice = match arg {
                "+1" | "1" | "up" => VoteState::Up,
                "-1" | "down" => VoteState::Down,
                other => return Err(format!("voto inválido '{}': use +1 ou -1", other)),
            };
            Command::Vote {
                post_id: id,
                choice,
            }
        }
        "report" => {
            let (id, reason) = split_id(rest)?;
            Command::Report {
                post_id: id,
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            }
        }
        "trending" => Command::Trending,
        "status" => Command::Status,
        "theme" | "tema" => {
            if rest.is_empty() {
                Command::Theme(None)
            } else {
                Command::Theme(Some(rest.parse()?))
            }
        }
        "help" | "ajuda" | "?" => Command::Help,
        "quit" | "exit" | "sair" => Command::Quit,
        other => return Err(format!("comando desconhecido '{}' (digite help)", other)),
    };
    Ok(Some(command))
}

fn split_id(rest: &str) -> Result<(PostId, &str), String> {
    let (id, tail) = match rest.split_once(char::is_whitespace) {
        Some((id, tail)) => (id, tail.trim()),
        None => (rest, ""),
    };
    if id.is_empty() {
        return Err("faltou o id do post".to_string());
    }
    Ok((PostId::from(id), tail))
}
