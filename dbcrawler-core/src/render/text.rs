//! Plain-text report.
//!
//! One fact per line so reports diff cleanly. Traversal order is fixed:
//! schemas, then per schema tables, routines, sequences and synonyms; within
//! a table columns in ordinal order, then primary key, constraints, indexes,
//! foreign keys, privileges and row count.

use std::fmt;

use super::portable::Namer;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::models::{
    Catalog, Column, ColumnReference, ForeignKey, Privilege, Routine, Schema, Sequence, Synonym,
    Table, TableKind,
};

/// Marker appended to references whose target is not in the model.
pub const UNRESOLVED_MARKER: &str = "<unresolved>";

/// A renderable view of a crawl result.
pub struct TextReport<'a> {
    catalog: &'a Catalog,
    diagnostics: &'a [Diagnostic],
    namer: Namer,
}

impl<'a> TextReport<'a> {
    pub fn new(catalog: &'a Catalog, diagnostics: &'a [Diagnostic], portable_names: bool) -> Self {
        Self {
            catalog,
            diagnostics,
            namer: Namer::new(portable_names),
        }
    }

    fn header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namer.is_portable() {
            return Ok(());
        }
        let info = self.catalog.database_info();
        match &info.product_version {
            Some(version) => writeln!(f, "database {} {}", info.product_name, version)?,
            None => writeln!(f, "database {}", info.product_name)?,
        }
        if let Some(catalog) = &info.catalog_name {
            writeln!(f, "catalog {}", catalog)?;
        }
        Ok(())
    }

    fn schema(&self, f: &mut fmt::Formatter<'_>, schema: &Schema) -> fmt::Result {
        let namer = self.namer;
        writeln!(f, "schema {}", namer.ident(&schema.name))?;

        let mut tables: Vec<&Table> = self.catalog.tables_in(schema).collect();
        namer.sort_by_key(&mut tables, |t| namer.table(&t.name));
        for table in tables {
            writeln!(f)?;
            self.table(f, table)?;
        }

        let mut routines: Vec<&Routine> = self.catalog.routines_in(schema).collect();
        namer.sort_by_key(&mut routines, |r| namer.object(&r.name));
        for routine in routines {
            writeln!(f)?;
            self.routine(f, routine)?;
        }

        let mut sequences: Vec<&Sequence> = self.catalog.sequences_in(schema).collect();
        namer.sort_by_key(&mut sequences, |s| namer.object(&s.name));
        if !sequences.is_empty() {
            writeln!(f)?;
        }
        for sequence in sequences {
            self.sequence(f, sequence)?;
        }

        let mut synonyms: Vec<&Synonym> = self.catalog.synonyms_in(schema).collect();
        namer.sort_by_key(&mut synonyms, |s| namer.object(&s.name));
        if !synonyms.is_empty() {
            writeln!(f)?;
        }
        for synonym in synonyms {
            self.synonym(f, synonym)?;
        }
        Ok(())
    }

    fn table(&self, f: &mut fmt::Formatter<'_>, table: &Table) -> fmt::Result {
        let namer = self.namer;
        let kind = match table.kind {
            TableKind::Table => "table",
            TableKind::View => "view",
        };
        writeln!(f, "  {} {}", kind, namer.table(&table.name))?;
        if let Some(remarks) = &table.remarks {
            writeln!(f, "    remarks: {}", remarks)?;
        }

        for column in &table.columns {
            self.column(f, column)?;
        }

        if let Some(primary_key) = &table.primary_key {
            writeln!(
                f,
                "    primary key {} ({})",
                namer.ident(&primary_key.name),
                self.column_list(&primary_key.columns)
            )?;
        }

        let mut constraints: Vec<_> = table.constraints.iter().collect();
        namer.sort_by_key(&mut constraints, |c| namer.ident(&c.name).into_owned());
        for constraint in constraints {
            write!(
                f,
                "    constraint {} {} ({})",
                namer.ident(&constraint.name),
                constraint.constraint_type,
                self.column_list(&constraint.columns)
            )?;
            match &constraint.definition {
                Some(definition) => writeln!(f, " {}", definition)?,
                None => writeln!(f)?,
            }
        }

        let mut indexes: Vec<_> = table.indexes.iter().collect();
        namer.sort_by_key(&mut indexes, |i| namer.ident(&i.name).into_owned());
        for index in indexes {
            let columns: Vec<String> = index
                .columns
                .iter()
                .map(|c| format!("{} {}", self.reference(&c.column), c.direction))
                .collect();
            writeln!(
                f,
                "    {} {} ({})",
                if index.is_unique { "unique index" } else { "index" },
                namer.ident(&index.name),
                columns.join(", ")
            )?;
        }

        let mut foreign_keys: Vec<_> = table.foreign_keys.iter().collect();
        namer.sort_by_key(&mut foreign_keys, |k| namer.ident(&k.name).into_owned());
        for foreign_key in foreign_keys {
            self.foreign_key(f, foreign_key)?;
        }

        self.privileges(f, "    ", &table.privileges)?;

        if let Some(row_count) = table.row_count {
            writeln!(f, "    rows {}", row_count)?;
        }
        Ok(())
    }

    fn column(&self, f: &mut fmt::Formatter<'_>, column: &Column) -> fmt::Result {
        write!(
            f,
            "    column {} {} {}",
            self.namer.ident(&column.name),
            self.namer.data_type(&column.data_type),
            if column.is_nullable { "null" } else { "not null" }
        )?;
        if let Some(default) = &column.default_value {
            write!(f, " default {}", default)?;
        }
        if column.is_part_of_primary_key {
            write!(f, " pk")?;
        }
        writeln!(f)?;
        if let Some(remarks) = &column.remarks {
            writeln!(f, "      remarks: {}", remarks)?;
        }
        self.privileges(f, "      ", &column.privileges)
    }

    fn foreign_key(&self, f: &mut fmt::Formatter<'_>, foreign_key: &ForeignKey) -> fmt::Result {
        let namer = self.namer;
        let local: Vec<String> = foreign_key
            .column_pairs
            .iter()
            .map(|pair| self.reference(&pair.foreign_key_column))
            .collect();
        let remote: Vec<String> = foreign_key
            .column_pairs
            .iter()
            .map(|pair| namer.ident(&pair.primary_key_column.name.column).into_owned())
            .collect();
        let target = foreign_key
            .referenced_table()
            .map(|table| namer.table(&table))
            .unwrap_or_default();

        write!(
            f,
            "    foreign key {} ({}) -> {} ({})",
            namer.ident(&foreign_key.name),
            local.join(", "),
            target,
            remote.join(", ")
        )?;
        if !foreign_key.is_resolved() {
            write!(f, " {}", UNRESOLVED_MARKER)?;
        }
        writeln!(
            f,
            " on update {} on delete {}",
            foreign_key.update_rule, foreign_key.delete_rule
        )
    }

    fn privileges(
        &self,
        f: &mut fmt::Formatter<'_>,
        indent: &str,
        privileges: &[Privilege],
    ) -> fmt::Result {
        for privilege in privileges {
            for grant in &privilege.grants {
                write!(f, "{}grant {} to {}", indent, privilege.name, grant.grantee)?;
                if let Some(grantor) = &grant.grantor {
                    write!(f, " by {}", grantor)?;
                }
                if grant.is_grantable {
                    write!(f, " with grant option")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }

    fn routine(&self, f: &mut fmt::Formatter<'_>, routine: &Routine) -> fmt::Result {
        let namer = self.namer;
        write!(f, "  {} {}", routine.kind, namer.object(&routine.name))?;
        if !namer.is_portable() && routine.specific_name != routine.name.name {
            write!(f, " specific {}", routine.specific_name)?;
        }
        if let Some(return_type) = &routine.return_type {
            write!(f, " returns {}", namer.data_type(return_type))?;
        }
        writeln!(f)?;
        if let Some(remarks) = &routine.remarks {
            writeln!(f, "    remarks: {}", remarks)?;
        }
        for parameter in &routine.parameters {
            writeln!(
                f,
                "    parameter {} {} {}",
                parameter.direction,
                namer.ident(&parameter.name),
                namer.data_type(&parameter.data_type)
            )?;
        }
        Ok(())
    }

    fn sequence(&self, f: &mut fmt::Formatter<'_>, sequence: &Sequence) -> fmt::Result {
        write!(
            f,
            "  sequence {} increment {}",
            self.namer.object(&sequence.name),
            sequence.increment
        )?;
        if let Some(minimum) = sequence.minimum_value {
            write!(f, " min {}", minimum)?;
        }
        if let Some(maximum) = sequence.maximum_value {
            write!(f, " max {}", maximum)?;
        }
        writeln!(f, "{}", if sequence.cycle { " cycle" } else { " no cycle" })
    }

    fn synonym(&self, f: &mut fmt::Formatter<'_>, synonym: &Synonym) -> fmt::Result {
        write!(
            f,
            "  synonym {} -> {}",
            self.namer.object(&synonym.name),
            self.namer.object(&synonym.referent.name)
        )?;
        if !synonym.referent.is_resolved() {
            write!(f, " {}", UNRESOLVED_MARKER)?;
        }
        writeln!(f)
    }

    /// Column name within its own table, marked when it did not resolve.
    fn reference(&self, reference: &ColumnReference) -> String {
        let name = self.namer.ident(&reference.name.column);
        if reference.is_resolved() {
            name.into_owned()
        } else {
            format!("{} {}", name, UNRESOLVED_MARKER)
        }
    }

    /// Portable reports name no product, so gaps lose their product suffix.
    fn diagnostic(&self, f: &mut fmt::Formatter<'_>, diagnostic: &Diagnostic) -> fmt::Result {
        if !self.namer.is_portable() {
            return writeln!(f, "  {}", diagnostic);
        }
        write!(f, "  [{}] {}", diagnostic.kind, diagnostic.category)?;
        if let Some(object) = &diagnostic.object {
            write!(f, " {}", self.namer.qualified(object))?;
        }
        match diagnostic.kind {
            DiagnosticKind::CapabilityGap => writeln!(f, ": not supported"),
            DiagnosticKind::ObjectRetrieval => writeln!(f, ": {}", diagnostic.message),
        }
    }

    fn column_list(&self, references: &[ColumnReference]) -> String {
        references
            .iter()
            .map(|reference| self.reference(reference))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.header(f)?;

        let mut schemas: Vec<&Schema> = self.catalog.schemas().iter().collect();
        let namer = self.namer;
        namer.sort_by_key(&mut schemas, |s| namer.ident(&s.name).into_owned());
        for schema in schemas {
            writeln!(f)?;
            self.schema(f, schema)?;
        }

        if !self.diagnostics.is_empty() {
            writeln!(f)?;
            writeln!(f, "diagnostics")?;
            for diagnostic in self.diagnostics {
                self.diagnostic(f, diagnostic)?;
            }
        }
        Ok(())
    }
}
