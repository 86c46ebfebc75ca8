use std::path::{Path, PathBuf};

use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    error::{CompileError, CompileResult},
    lexer,
    parser::Parser,
    tokens::Span,
};

use super::LowerCtx;

impl<'a> LowerCtx<'a> {
    /// Candidate locations for an include, in search order: next to the
    /// including file, each include directory, then the working directory.
    fn include_candidates(&self, path: &Path) -> Vec<PathBuf> {
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        let mut candidates = Vec::new();
        if let Some(dir) = self.file_dirs.last() {
            candidates.push(dir.join(path));
        }
        candidates.extend(self.options.include_dirs.iter().map(|dir| dir.join(path)));
        candidates.push(path.to_path_buf());
        candidates
    }

    /// Replaces `#include "path"` with the lowered contents of the file. A
    /// file already included once expands to nothing.
    pub(super) fn include(&mut self, path: SymbolUsize, span: Span) -> CompileResult<()> {
        let requested = PathBuf::from(self.name(path));
        let Some(found) = self.include_candidates(&requested).into_iter().find(|p| p.is_file()) else {
            return Err(CompileError::Io {
                path: requested,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file in the include path"),
            });
        };
        let canonical = found.canonicalize().map_err(|source| CompileError::Io {
            path: found.clone(),
            source,
        })?;

        if !self.included.insert(canonical.clone()) {
            tracing::debug!(path = %canonical.display(), "skipping repeated include");
            self.current_block_mut()?.replace_current(Vec::new());
            return Ok(());
        }

        let source = std::fs::read_to_string(&canonical).map_err(|source| CompileError::Io {
            path: canonical.clone(),
            source,
        })?;
        let file = self.interner.get_or_intern(canonical.display().to_string());
        let tokens = lexer::tokenize(&source, self.interner, file)?;
        let block = Parser::new(tokens, self.ast, self.interner).parse_fragment()?;
        tracing::debug!(path = %canonical.display(), "including file");

        self.file_dirs
            .push(canonical.parent().map(Path::to_path_buf).unwrap_or_default());
        let result = self.lower_fragment(block, span);
        self.file_dirs.pop();
        result
    }
}
