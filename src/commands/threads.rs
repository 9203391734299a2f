use super::ThreadsCommand;
use crate::api::{ConversationClient, Thread};
use crate::error::AppError;

pub async fn run(client: &ConversationClient, action: ThreadsCommand) -> Result<(), AppError> {
    match action {
        ThreadsCommand::List => {
            let threads = client.list_threads().await?;
            if threads.is_empty() {
                println!("No threads yet.");
            }
            for thread in &threads {
                println!("{}", format_thread(thread));
            }
        }
        ThreadsCommand::Create { name } => {
            let id = client.create_thread(&name).await?;
            println!("Created thread {id}");
        }
        ThreadsCommand::Rename { thread_id, name } => {
            client.rename_thread(&thread_id, &name).await?;
            println!("Renamed thread {thread_id}");
        }
        ThreadsCommand::Delete { thread_id } => {
            client.delete_thread(&thread_id).await?;
            println!("Deleted thread {thread_id}");
        }
    }
    Ok(())
}

fn format_thread(thread: &Thread) -> String {
    format!("{:>6}  {}", thread.id, thread.name)
}
