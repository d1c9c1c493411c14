//! Records of the packed corpus.
//!
//! Field numbers are part of the on-disk format, do not renumber them.

/// One code vector, a row of the quantized code array.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Semantics {
    #[prost(uint32, repeated, tag = "1")]
    pub values: Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sentence {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(string, repeated, tag = "2")]
    pub phones: Vec<String>,
    #[prost(message, repeated, tag = "3")]
    pub semantics: Vec<Semantics>,
}

/// All sentences of one speaker or folder of a source dataset.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextData {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, repeated, tag = "3")]
    pub languages: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub sentences: Vec<Sentence>,
}
