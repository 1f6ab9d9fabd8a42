use crate::{
    file::parser::Parser,
    metadata::{
        signatures::{ArrayShape, MethodSignature, PrimitiveType, SignatureHeader, ELEMENT_TYPE},
        token::Token,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting depth of a single type in a signature
const MAX_RECURSION_DEPTH: usize = 50;

/// Builds the caller's type representation from the pieces of a signature.
///
/// The decoder only knows the signature grammar; everything that needs metadata context
/// (resolving a `TypeDefOrRef` token to a name, deciding what a modifier means) is delegated here.
pub trait TypeProvider {
    /// The type representation produced
    type Type;

    /// A built-in type
    fn primitive(&self, primitive: PrimitiveType) -> Self::Type;

    /// A `CLASS` / `VALUETYPE` reference, or a custom modifier's type.
    ///
    /// # Errors
    /// Returns an error if `token` does not resolve.
    fn type_from_handle(&self, token: Token, is_value_type: bool) -> Result<Self::Type>;

    /// A single-dimensional, zero-based array
    fn sz_array(&self, element: Self::Type) -> Self::Type;

    /// A general array
    fn array(&self, element: Self::Type, shape: ArrayShape) -> Self::Type;

    /// An unmanaged pointer
    fn pointer(&self, element: Self::Type) -> Self::Type;

    /// A managed reference
    fn by_ref(&self, element: Self::Type) -> Self::Type;

    /// A pinned local; most providers don't distinguish it
    fn pinned(&self, element: Self::Type) -> Self::Type {
        element
    }

    /// `definition<arguments...>`
    fn generic_instantiation(
        &self,
        definition: Self::Type,
        arguments: Vec<Self::Type>,
    ) -> Self::Type;

    /// `!index`
    fn generic_type_parameter(&self, index: u32) -> Self::Type;

    /// `!!index`
    fn generic_method_parameter(&self, index: u32) -> Self::Type;

    /// `unmodified modreq(modifier)` or `unmodified modopt(modifier)`
    fn modified(&self, modifier: Self::Type, unmodified: Self::Type, required: bool) -> Self::Type;

    /// A function pointer
    fn function_pointer(&self, signature: MethodSignature<Self::Type>) -> Self::Type;
}

/// Decodes signature blobs (ECMA-335 II.23.2) through a [`TypeProvider`].
///
/// # Example
///
/// ```rust
/// use cilguard::metadata::signatures::{SignatureDecoder, TypeProvider};
/// # use cilguard::metadata::signatures::{ArrayShape, MethodSignature, PrimitiveType};
/// # use cilguard::metadata::token::Token;
/// # struct Names;
/// # impl TypeProvider for Names {
/// #     type Type = String;
/// #     fn primitive(&self, p: PrimitiveType) -> String { p.to_string() }
/// #     fn type_from_handle(&self, t: Token, _: bool) -> cilguard::Result<String> {
/// #         Ok(t.to_string())
/// #     }
/// #     fn sz_array(&self, e: String) -> String { format!("{e}[]") }
/// #     fn array(&self, e: String, _: ArrayShape) -> String { format!("{e}[,]") }
/// #     fn pointer(&self, e: String) -> String { format!("{e}*") }
/// #     fn by_ref(&self, e: String) -> String { format!("{e}&") }
/// #     fn generic_instantiation(&self, d: String, a: Vec<String>) -> String {
/// #         format!("{d}<{}>", a.join(","))
/// #     }
/// #     fn generic_type_parameter(&self, i: u32) -> String { format!("!{i}") }
/// #     fn generic_method_parameter(&self, i: u32) -> String { format!("!!{i}") }
/// #     fn modified(&self, _: String, u: String, _: bool) -> String { u }
/// #     fn function_pointer(&self, _: MethodSignature<String>) -> String { "method".into() }
/// # }
/// let data = &[0x20, 0x01, 0x01, 0x0E];
/// let mut decoder = SignatureDecoder::new(data, &Names);
/// let sig = decoder.decode_method_signature()?;
/// assert_eq!(sig.parameter_types, vec!["String".to_string()]);
/// # Ok::<(), cilguard::Error>(())
/// ```
pub struct SignatureDecoder<'a, 'p, P: TypeProvider> {
    parser: Parser<'a>,
    provider: &'p P,
    depth: usize,
}

impl<'a, 'p, P: TypeProvider> SignatureDecoder<'a, 'p, P> {
    /// Create a decoder over one signature blob
    #[must_use]
    pub fn new(data: &'a [u8], provider: &'p P) -> Self {
        SignatureDecoder {
            parser: Parser::new(data),
            provider,
            depth: 0,
        }
    }

    /// Decode a single type, including any custom modifiers in front of it.
    ///
    /// # Errors
    /// Returns [`crate::Error::RecursionLimit`] for types nested too deeply, or a malformed
    /// error for unknown element types.
    pub fn decode_type(&mut self) -> Result<P::Type> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let decoded = self.decode_type_inner();
        self.depth -= 1;
        decoded
    }

    fn decode_type_inner(&mut self) -> Result<P::Type> {
        let current_byte = self.parser.read_le::<u8>()?;
        if let Some(primitive) = PrimitiveType::from_element_type(current_byte) {
            return Ok(self.provider.primitive(primitive));
        }

        match current_byte {
            ELEMENT_TYPE::PTR => {
                let element = self.decode_type()?;
                Ok(self.provider.pointer(element))
            }
            ELEMENT_TYPE::BYREF => {
                let element = self.decode_type()?;
                Ok(self.provider.by_ref(element))
            }
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
                let token = self.parser.read_compressed_token()?;
                self.provider
                    .type_from_handle(token, current_byte == ELEMENT_TYPE::VALUETYPE)
            }
            ELEMENT_TYPE::VAR => {
                let index = self.parser.read_compressed_uint()?;
                Ok(self.provider.generic_type_parameter(index))
            }
            ELEMENT_TYPE::MVAR => {
                let index = self.parser.read_compressed_uint()?;
                Ok(self.provider.generic_method_parameter(index))
            }
            ELEMENT_TYPE::ARRAY => {
                let element = self.decode_type()?;
                let shape = self.decode_array_shape()?;
                Ok(self.provider.array(element, shape))
            }
            ELEMENT_TYPE::SZARRAY => {
                let element = self.decode_type()?;
                Ok(self.provider.sz_array(element))
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.parser.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                let definition = self.decode_type()?;
                let arg_count = self.parser.read_compressed_uint()?;
                if arg_count == 0 {
                    return Err(malformed_error!("GENERICINST without type arguments"));
                }

                let mut arguments = Vec::with_capacity(arg_count.min(64) as usize);
                for _ in 0..arg_count {
                    arguments.push(self.decode_type()?);
                }

                Ok(self.provider.generic_instantiation(definition, arguments))
            }
            ELEMENT_TYPE::FNPTR => {
                let signature = self.decode_method_signature()?;
                Ok(self.provider.function_pointer(signature))
            }
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let token = self.parser.read_compressed_token()?;
                let modifier = self.provider.type_from_handle(token, false)?;
                let unmodified = self.decode_type()?;
                Ok(self.provider.modified(
                    modifier,
                    unmodified,
                    current_byte == ELEMENT_TYPE::CMOD_REQD,
                ))
            }
            ELEMENT_TYPE::PINNED => {
                let element = self.decode_type()?;
                Ok(self.provider.pinned(element))
            }
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {}",
                current_byte
            )),
        }
    }

    fn decode_array_shape(&mut self) -> Result<ArrayShape> {
        let rank = self.parser.read_compressed_uint()?;

        let num_sizes = self.parser.read_compressed_uint()?;
        if num_sizes > rank {
            return Err(malformed_error!(
                "ARRAY - {} sizes for rank {}",
                num_sizes,
                rank
            ));
        }
        let mut sizes = Vec::with_capacity(num_sizes as usize);
        for _ in 0..num_sizes {
            sizes.push(self.parser.read_compressed_uint()?);
        }

        let num_lo_bounds = self.parser.read_compressed_uint()?;
        if num_lo_bounds > rank {
            return Err(malformed_error!(
                "ARRAY - {} lower bounds for rank {}",
                num_lo_bounds,
                rank
            ));
        }
        let mut lower_bounds = Vec::with_capacity(num_lo_bounds as usize);
        for _ in 0..num_lo_bounds {
            lower_bounds.push(self.parser.read_compressed_uint()?);
        }

        Ok(ArrayShape {
            rank,
            sizes,
            lower_bounds,
        })
    }

    /// Decode a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig` (II.23.2.1 - II.23.2.3).
    ///
    /// Parameters after a vararg sentinel are kept in `parameter_types`;
    /// `required_parameter_count` marks where they begin.
    ///
    /// # Errors
    /// Returns an error if the blob is not a method signature or is truncated.
    pub fn decode_method_signature(&mut self) -> Result<MethodSignature<P::Type>> {
        let header = SignatureHeader(self.parser.read_le::<u8>()?);
        if !header.is_method() {
            return Err(malformed_error!(
                "SignatureMethod - invalid start - {}",
                header.0
            ));
        }

        let generic_parameter_count = if header.is_generic() {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.parser.read_compressed_uint()? as usize;
        let return_type = self.decode_type()?;

        let mut required_parameter_count = param_count;
        let mut parameter_types = Vec::with_capacity(param_count.min(256));
        for index in 0..param_count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                if required_parameter_count != param_count {
                    return Err(malformed_error!("Duplicate vararg sentinel"));
                }

                self.parser.advance()?;
                required_parameter_count = index;
            }

            parameter_types.push(self.decode_type()?);
        }

        Ok(MethodSignature {
            header,
            return_type,
            required_parameter_count,
            generic_parameter_count,
            parameter_types,
        })
    }

    /// Decode a field signature (II.23.2.4)
    ///
    /// # Errors
    /// Returns an error if the header is not `FIELD` or the type cannot be decoded.
    pub fn decode_field_signature(&mut self) -> Result<P::Type> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SignatureHeader::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        self.decode_type()
    }

    /// Peek at the header byte without consuming it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on an empty blob.
    pub fn peek_header(&self) -> Result<SignatureHeader> {
        Ok(SignatureHeader(self.parser.peek_byte()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Renders decoded types in ILAsm-like notation
    struct Names;

    impl TypeProvider for Names {
        type Type = String;

        fn primitive(&self, primitive: PrimitiveType) -> String {
            primitive.to_string()
        }

        fn type_from_handle(&self, token: Token, is_value_type: bool) -> Result<String> {
            if token.row() == 0 {
                return Err(invariant_error!("nil type handle"));
            }
            let kind = if is_value_type { "valuetype" } else { "class" };
            Ok(format!("{kind} {token}"))
        }

        fn sz_array(&self, element: String) -> String {
            format!("{element}[]")
        }

        fn array(&self, element: String, shape: ArrayShape) -> String {
            format!("{element}[rank {}]", shape.rank)
        }

        fn pointer(&self, element: String) -> String {
            format!("{element}*")
        }

        fn by_ref(&self, element: String) -> String {
            format!("{element}&")
        }

        fn generic_instantiation(&self, definition: String, arguments: Vec<String>) -> String {
            format!("{definition}<{}>", arguments.join(", "))
        }

        fn generic_type_parameter(&self, index: u32) -> String {
            format!("!{index}")
        }

        fn generic_method_parameter(&self, index: u32) -> String {
            format!("!!{index}")
        }

        fn modified(&self, modifier: String, unmodified: String, required: bool) -> String {
            let kind = if required { "modreq" } else { "modopt" };
            format!("{unmodified} {kind}({modifier})")
        }

        fn function_pointer(&self, signature: MethodSignature<String>) -> String {
            format!("method {}*({})", signature.return_type, signature.parameter_types.join(", "))
        }
    }

    #[test]
    fn method_simple() {
        let data = [0x20, 0x02, 0x01, 0x0E, 0x08];
        let sig = SignatureDecoder::new(&data, &Names)
            .decode_method_signature()
            .unwrap();

        assert!(sig.header.has_this());
        assert_eq!(sig.return_type, "Void");
        assert_eq!(sig.parameter_types, vec!["String", "Int32"]);
        assert_eq!(sig.required_parameter_count, 2);
        assert_eq!(sig.generic_parameter_count, 0);
    }

    #[test]
    fn method_generic() {
        // !!0 Method<2>(!!1[], class 0x01000005)
        let data = [0x10, 0x02, 0x02, 0x1E, 0x00, 0x1D, 0x1E, 0x01, 0x12, 0x15];
        let sig = SignatureDecoder::new(&data, &Names)
            .decode_method_signature()
            .unwrap();

        assert_eq!(sig.generic_parameter_count, 2);
        assert_eq!(sig.return_type, "!!0");
        assert_eq!(sig.parameter_types, vec!["!!1[]", "class 0x01000005"]);
    }

    #[test]
    fn method_vararg() {
        let data = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0E];
        let sig = SignatureDecoder::new(&data, &Names)
            .decode_method_signature()
            .unwrap();

        assert!(sig.header.is_vararg());
        assert_eq!(sig.required_parameter_count, 1);
        assert_eq!(sig.parameter_types, vec!["Int32", "String"]);
    }

    #[test]
    fn field_modified() {
        // int32 modreq(class 0x01000002)
        let data = [0x06, 0x1F, 0x09, 0x08];
        let field = SignatureDecoder::new(&data, &Names)
            .decode_field_signature()
            .unwrap();

        assert_eq!(field, "Int32 modreq(class 0x01000002)");

        let data = [0x07, 0x08];
        assert!(SignatureDecoder::new(&data, &Names)
            .decode_field_signature()
            .is_err());
    }

    #[test]
    fn generic_instance_and_array() {
        // GENERICINST CLASS TypeRef(1) 2 I4 VALUETYPE TypeDef(2)
        let data = [0x15, 0x12, 0x05, 0x02, 0x08, 0x11, 0x08];
        let ty = SignatureDecoder::new(&data, &Names).decode_type().unwrap();
        assert_eq!(ty, "class 0x01000001<Int32, valuetype 0x02000002>");

        // int32[,] with no sizes and no bounds
        let data = [0x14, 0x08, 0x02, 0x00, 0x00];
        let ty = SignatureDecoder::new(&data, &Names).decode_type().unwrap();
        assert_eq!(ty, "Int32[rank 2]");

        let data = [0x15, 0x08, 0x01, 0x08];
        assert!(SignatureDecoder::new(&data, &Names).decode_type().is_err());
    }

    #[test]
    fn pointers_and_fnptr() {
        let data = [0x10, 0x0F, 0x05];
        let ty = SignatureDecoder::new(&data, &Names).decode_type().unwrap();
        assert_eq!(ty, "Byte*&");

        let data = [0x1B, 0x00, 0x01, 0x08, 0x18];
        let ty = SignatureDecoder::new(&data, &Names).decode_type().unwrap();
        assert_eq!(ty, "method Int32*(IntPtr)");
    }

    #[test]
    fn recursion_limit() {
        let mut data = vec![0x1D; 60];
        data.push(0x08);

        let result = SignatureDecoder::new(&data, &Names).decode_type();
        assert!(matches!(result, Err(Error::RecursionLimit(MAX_RECURSION_DEPTH))));

        let mut data = vec![0x1D; 40];
        data.push(0x08);
        assert!(SignatureDecoder::new(&data, &Names).decode_type().is_ok());
    }

    #[test]
    fn truncated_and_unknown() {
        let data = [0x20, 0x02, 0x01, 0x0E];
        assert!(matches!(
            SignatureDecoder::new(&data, &Names).decode_method_signature(),
            Err(Error::OutOfBounds)
        ));

        let data = [0x17];
        assert!(SignatureDecoder::new(&data, &Names).decode_type().is_err());
    }
}
