use message_model::Message;
use tantivy::{IndexWriter, Term};
use tracing::{debug, info, warn};

use crate::document::MessageDocument;
use crate::schema::MessageSchema;
use crate::store::MessageIndex;
use crate::IndexError;

impl MessageIndex {
    /// Upsert `messages` into the index.
    ///
    /// Every message is mapped before anything is written, so a bad record
    /// aborts the call with nothing committed. Documents are then committed
    /// in batches of `batch_size`, each under its own exclusive lock:
    /// concurrent searches may observe the earlier batches of a running
    /// import, and a failed flush leaves the earlier batches in place.
    pub fn index_messages(&self, messages: &[Message]) -> Result<(), IndexError> {
        if messages.is_empty() {
            return Ok(());
        }
        let docs = messages
            .iter()
            .map(MessageDocument::from_message)
            .collect::<Result<Vec<_>, _>>()?;

        let batch_size = self.config().batch_size;
        for (n, batch) in docs.chunks(batch_size).enumerate() {
            self.flush_batch(batch)?;
            debug!(batch = n, docs = batch.len(), "batch committed");
        }
        info!(docs = docs.len(), "messages indexed");
        Ok(())
    }

    fn flush_batch(&self, batch: &[MessageDocument]) -> Result<(), IndexError> {
        let fields = self.fields();
        self.with_handle_mut(|h| {
            let writer = h
                .writer
                .get_mut()
                .map_err(|_| IndexError::Storage("index writer lock poisoned".into()))?;
            if let Err(e) = write_batch(writer, fields, batch) {
                if let Err(re) = writer.rollback() {
                    warn!(error = %re, "rollback after failed batch");
                }
                return Err(e);
            }
            h.reader.reload().map_err(|e| IndexError::Storage(format!("reload reader: {e}")))
        })
    }
}

fn write_batch(
    writer: &mut IndexWriter,
    fields: &MessageSchema,
    batch: &[MessageDocument],
) -> Result<(), IndexError> {
    for doc in batch {
        writer.delete_term(Term::from_field_text(fields.id, &doc.id));
        writer
            .add_document(doc.to_tantivy(fields))
            .map_err(|e| IndexError::Storage(format!("add document {}: {e}", doc.id)))?;
    }
    writer.commit().map_err(|e| IndexError::Storage(format!("commit batch: {e}")))?;
    Ok(())
}
