mod perm;

pub(crate) use perm::verify_conversation_perm;
