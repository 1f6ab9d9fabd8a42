use std::path::Path;

use anyhow::Context;
use cilguard::{
    sandbox::{
        provider::MetadataTypeProvider,
        scanners::{memberrefs::collect_member_refs, typerefs::collect_type_refs},
        Violations,
    },
    MemberRef, MetadataReader,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{emit, member_table, print_indented, type_table},
};

#[derive(Debug, Serialize)]
struct TypeEntry {
    reference: String,
    whitelist: String,
}

#[derive(Debug, Serialize)]
struct MemberEntry {
    token: String,
    kind: &'static str,
    reference: String,
}

#[derive(Debug, Serialize)]
struct RefsOutput {
    assembly: String,
    types: Vec<TypeEntry>,
    members: Vec<MemberEntry>,
    unsupported: Vec<String>,
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let reader = MetadataReader::from_file(path)
        .with_context(|| format!("failed to load assembly: {}", path.display()))?;
    let provider = MetadataTypeProvider::new(&reader);
    let unsupported = Violations::new();

    let types = collect_type_refs(&provider, &unsupported)?
        .iter()
        .map(|reference| TypeEntry {
            reference: reference.to_string(),
            whitelist: reference.whitelist_to_string(),
        })
        .collect();
    let members = collect_member_refs(&provider, &unsupported, true)?
        .iter()
        .map(|member| MemberEntry {
            token: member.token().to_string(),
            kind: match member {
                MemberRef::Field { .. } => "field",
                MemberRef::Method { .. } => "method",
            },
            reference: member.to_string(),
        })
        .collect();

    let output = RefsOutput {
        assembly: reader.assembly_name()?.to_string(),
        types,
        members,
        unsupported: unsupported
            .sorted()
            .into_iter()
            .map(|violation| violation.message)
            .collect(),
    };

    emit(&output, opts, |out| {
        println!("{}", out.assembly);

        println!("\nType references ({}):", out.types.len());
        print_indented(&type_table(
            out.types
                .iter()
                .map(|entry| (entry.reference.as_str(), entry.whitelist.as_str())),
        ));

        println!("\nMember references ({}):", out.members.len());
        print_indented(&member_table(out.members.iter().map(|entry| {
            (entry.token.as_str(), entry.kind, entry.reference.as_str())
        })));

        if !out.unsupported.is_empty() {
            println!("\nUnsupported references ({}):", out.unsupported.len());
            for message in &out.unsupported {
                println!("  {message}");
            }
        }
    })
}
