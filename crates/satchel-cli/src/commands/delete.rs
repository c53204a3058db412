use satchel_core::{Assignment, RecordId, RecordKind, Submission};

use crate::commands::common::{parse_record_id, settle_write, Session};
use crate::error::CliError;

pub async fn delete_record(
    session: &Session,
    kind: RecordKind,
    id: &str,
) -> Result<(RecordId, &'static str), CliError> {
    let id = parse_record_id(id)?;
    let outcome = match kind {
        RecordKind::Assignment => {
            let mut receipt = session.engine.delete::<Assignment>(id.clone()).await?;
            settle_write(&session.engine, &mut receipt).await?
        }
        RecordKind::Submission => {
            let mut receipt = session.engine.delete::<Submission>(id.clone()).await?;
            settle_write(&session.engine, &mut receipt).await?
        }
    };
    Ok((id, outcome))
}

pub async fn run_delete(session: &Session, kind: RecordKind, id: &str) -> Result<(), CliError> {
    let (id, outcome) = delete_record(session, kind, id).await?;
    println!("{id}  ({outcome})");
    Ok(())
}
