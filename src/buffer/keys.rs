use slotmap::new_key_type;

new_key_type! { pub struct BufferKey; }
